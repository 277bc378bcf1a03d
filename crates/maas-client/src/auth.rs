//! MAAS API key handling
//!
//! MAAS authenticates API clients with OAuth 1.0 using the PLAINTEXT signature
//! method. The key handed out by MAAS is three colon-separated parts:
//! `consumer_key:token_key:token_secret`. The consumer secret is always empty.

use crate::error::MaasError;
use std::fmt;

/// Parsed MAAS API key
#[derive(Clone)]
pub struct MaasApiKey {
    consumer_key: String,
    token_key: String,
    token_secret: String,
}

impl fmt::Debug for MaasApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaasApiKey")
            .field("consumer_key", &self.consumer_key)
            .field("token_key", &self.token_key)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

impl MaasApiKey {
    /// Parse a `consumer:token:secret` key
    pub fn parse(raw: &str) -> Result<Self, MaasError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        match parts.as_slice() {
            [consumer, token, secret]
                if !consumer.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: (*consumer).to_string(),
                    token_key: (*token).to_string(),
                    token_secret: (*secret).to_string(),
                })
            }
            _ => Err(MaasError::Authentication(
                "API key must have the form consumer:token:secret".to_string(),
            )),
        }
    }

    /// Build the `Authorization` header value for one request.
    ///
    /// Nonce and timestamp are generated per call; PLAINTEXT signatures are
    /// `consumer_secret&token_secret` with an empty consumer secret.
    pub fn authorization_header(&self) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        self.authorization_header_with(&nonce, timestamp)
    }

    pub(crate) fn authorization_header_with(&self, nonce: &str, timestamp: i64) -> String {
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"&{}\", \
             oauth_nonce=\"{}\", oauth_timestamp=\"{}\"",
            urlencoding::encode(&self.consumer_key),
            urlencoding::encode(&self.token_key),
            urlencoding::encode(&self.token_secret),
            nonce,
            timestamp,
        )
    }
}
