use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// One invocation payload: which endpoint to dial and how to tag the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRequest {
    pub name: String,
    pub environment: String,
    #[serde(rename = "ip")]
    pub address: String,
    pub port: String,
}

impl CheckRequest {
    pub fn new(
        name: impl Into<String>,
        environment: impl Into<String>,
        address: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment: environment.into(),
            address: address.into(),
            port: port.into(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ProbeError::InvalidArgument(format!("bad invocation event: {e}")))
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        let host = self.address.trim();
        if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]:{}", self.port.trim())
        } else {
            format!("{host}:{}", self.port.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_with_ip_field() {
        let req = CheckRequest::from_json(
            r#"{"name":"auth-svc","environment":"prod","ip":"127.0.0.1","port":"9"}"#,
        )
        .unwrap();
        assert_eq!(req, CheckRequest::new("auth-svc", "prod", "127.0.0.1", "9"));
    }

    #[test]
    fn rejects_incomplete_event() {
        let err = CheckRequest::from_json(r#"{"name":"auth-svc","ip":"127.0.0.1"}"#).unwrap_err();
        assert!(matches!(err, ProbeError::InvalidArgument(_)));
    }

    #[test]
    fn endpoint_formats_v4_hostname_and_v6() {
        assert_eq!(
            CheckRequest::new("a", "b", "10.0.0.1", "5432").endpoint(),
            "10.0.0.1:5432"
        );
        assert_eq!(
            CheckRequest::new("a", "b", "db.internal", "5432").endpoint(),
            "db.internal:5432"
        );
        assert_eq!(CheckRequest::new("a", "b", "::1", "80").endpoint(), "[::1]:80");
    }

    #[test]
    fn serializes_address_as_ip() {
        let json = serde_json::to_value(CheckRequest::new("a", "b", "10.0.0.1", "80")).unwrap();
        assert_eq!(json["ip"], "10.0.0.1");
        assert!(json.get("address").is_none());
    }
}
