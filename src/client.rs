//! Client identification for tracking records
//!
//! The transport layer is a collaborator; it hands over raw header values
//! and the socket address, and this module decides which address to record.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Recorded when no candidate address parses as an IP.
pub const UNKNOWN_ADDRESS: &str = "0.0.0.0";

/// Network address and agent string of the requesting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub address: String,
    pub agent: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            address: UNKNOWN_ADDRESS.to_string(),
            agent: String::new(),
        }
    }
}

impl ClientInfo {
    pub fn new(address: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            agent: agent.into(),
        }
    }

    /// Resolve the client address in priority order: `Client-IP`, the first
    /// `X-Forwarded-For` hop, then the socket's remote address. The chosen
    /// candidate is recorded only if it is a valid IP literal.
    pub fn from_headers(
        client_ip: Option<&str>,
        forwarded_for: Option<&str>,
        remote_addr: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let candidate = non_empty(client_ip)
            .or_else(|| non_empty(forwarded_for).and_then(|v| v.split(',').next()))
            .or_else(|| non_empty(remote_addr))
            .unwrap_or_default()
            .trim();

        let address = match candidate.parse::<IpAddr>() {
            Ok(ip) => ip.to_string(),
            Err(_) => UNKNOWN_ADDRESS.to_string(),
        };

        Self {
            address,
            agent: user_agent.unwrap_or_default().to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_header_wins() {
        let info = ClientInfo::from_headers(
            Some("192.0.2.10"),
            Some("198.51.100.1"),
            Some("10.0.0.1"),
            Some("curl/8.0"),
        );
        assert_eq!(info.address, "192.0.2.10");
        assert_eq!(info.agent, "curl/8.0");
    }

    #[test]
    fn test_first_forwarded_hop() {
        let info = ClientInfo::from_headers(None, Some(" 198.51.100.1, 10.0.0.2"), Some("10.0.0.1"), None);
        assert_eq!(info.address, "198.51.100.1");
    }

    #[test]
    fn test_remote_addr_fallback_and_ipv6() {
        let info = ClientInfo::from_headers(None, Some(""), Some("2001:db8::1"), None);
        assert_eq!(info.address, "2001:db8::1");
    }

    #[test]
    fn test_garbage_becomes_unknown() {
        let info = ClientInfo::from_headers(Some("not-an-ip"), None, None, None);
        assert_eq!(info.address, UNKNOWN_ADDRESS);
        let info = ClientInfo::from_headers(None, None, None, None);
        assert_eq!(info.address, UNKNOWN_ADDRESS);
    }
}
