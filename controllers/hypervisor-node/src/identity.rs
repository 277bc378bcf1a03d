//! Node identity

use crate::error::ControllerError;
use std::fmt;

/// Who this node is, as far as MAAS and Kubernetes are concerned
///
/// `system_id` is resolved once per process and is the key every idempotency
/// check against MAAS uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub name: String,
    pub ip_address: String,
    pub system_id: String,
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.system_id, self.ip_address)
    }
}

/// Extract the MAAS system id from a node's `spec.providerID`
///
/// The system id is the last non-empty path segment, so `maas:///zone-a/abc123`,
/// `maas://abc123` and a bare `abc123` all yield `abc123`.
pub fn parse_system_id(provider_id: &str) -> Result<String, ControllerError> {
    let path = provider_id
        .split_once("://")
        .map_or(provider_id, |(_, rest)| rest);
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
        .ok_or_else(|| {
            ControllerError::FactResolution(format!(
                "providerID {:?} does not contain a system id",
                provider_id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_id_forms() {
        assert_eq!(parse_system_id("maas:///zone-a/abc123").unwrap(), "abc123");
        assert_eq!(parse_system_id("maas://abc123").unwrap(), "abc123");
        assert_eq!(parse_system_id("maas:///abc123/").unwrap(), "abc123");
        assert_eq!(parse_system_id("abc123").unwrap(), "abc123");
    }

    #[test]
    fn test_parse_system_id_empty_is_fact_resolution_error() {
        assert!(matches!(parse_system_id(""), Err(ControllerError::FactResolution(_))));
        assert!(matches!(parse_system_id("maas:///"), Err(ControllerError::FactResolution(_))));
    }
}
