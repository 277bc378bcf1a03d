//! Common utilities for the MAAS API client
//!
//! Provides the authenticated HTTP wrapper shared by all handlers.

use crate::auth::MaasApiKey;
use crate::error::MaasError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// HTTP client wrapper with OAuth authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    key: MaasApiKey,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, key: MaasApiKey) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, MaasError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.key.authorization_header())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(MaasError::Http)?;

        Self::decode("GET", path, response).await
    }

    /// Make a form-encoded POST request
    pub async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, MaasError> {
        let url = self.build_url(path);
        debug!("POST {} with fields: {:?}", url, redact(form));

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.key.authorization_header())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(MaasError::Http)?;

        Self::decode("POST", path, response).await
    }

    /// Make a form-encoded PUT request
    pub async fn put_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, MaasError> {
        let url = self.build_url(path);
        debug!("PUT {} with fields: {:?}", url, redact(form));

        let response = self
            .client
            .put(&url)
            .header("Authorization", self.key.authorization_header())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(MaasError::Http)?;

        Self::decode("PUT", path, response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        method: &str,
        path: &str,
        response: Response,
    ) -> Result<T, MaasError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return serde_json::from_str(&text).map_err(|e| {
                MaasError::Api(format!(
                    "error decoding response body: {} - Response (first 500 chars): {}",
                    e,
                    text.chars().take(500).collect::<String>()
                ))
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(method, path, status, body))
    }
}

pub(crate) fn classify(method: &str, path: &str, status: StatusCode, body: String) -> MaasError {
    let msg = format!("{} {} failed: {} - {}", method, path, status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MaasError::Authentication(msg),
        StatusCode::NOT_FOUND => MaasError::NotFound(msg),
        StatusCode::CONFLICT => MaasError::Conflict(msg),
        StatusCode::BAD_REQUEST if is_duplicate_name(&body) => MaasError::Conflict(msg),
        StatusCode::BAD_REQUEST => MaasError::InvalidRequest(msg),
        s if s.is_server_error() => MaasError::Unavailable(msg),
        _ => MaasError::Api(msg),
    }
}

/// MAAS rejects a duplicate name as a form validation error (400), e.g.
/// `{"name": ["Pod with this Name already exists."]}`
fn is_duplicate_name(body: &str) -> bool {
    let Ok(errors) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    errors
        .get("name")
        .and_then(|messages| messages.as_array())
        .is_some_and(|messages| {
            messages
                .iter()
                .filter_map(|m| m.as_str())
                .any(|m| m.contains("already exists"))
        })
}

fn redact<'a>(form: &'a [(&'a str, String)]) -> Vec<(&'a str, &'a str)> {
    form.iter()
        .map(|(k, v)| {
            if *k == "password" {
                (*k, "<redacted>")
            } else {
                (*k, v.as_str())
            }
        })
        .collect()
}
