//! Response type definitions
//!
//! Defines the HTTP response returned by the transport and the JSON bodies
//! served by the webhook receiver.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// HTTP response as seen by the protocol engine
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header, in received order
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// Ping response for health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    /// Server uptime in seconds
    pub server_uptime: u64,

    /// Server version
    pub version: String,
}

impl PingResponse {
    /// Create a new ping response
    pub fn new(server_uptime: u64, version: impl Into<String>) -> Self {
        Self {
            server_uptime,
            version: version.into(),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Health report for the webhook receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the connection pool is within its limits
    pub healthy: bool,
    /// Connection pool telemetry
    pub pool: crate::pool::PoolStats,
    /// Nonces currently remembered
    pub stored_nonces: usize,
}

/// Acknowledgement for an accepted webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Accepted nonce
    pub nonce: String,
    /// Received payload
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_header_all_preserves_order() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let response = HttpResponse::new(200, headers, "");

        assert_eq!(response.header_all("Set-Cookie"), vec!["a=1", "b=2"]);
        assert_eq!(response.header("set-cookie"), Some("a=1"));
    }

    #[test]
    fn test_json_body() {
        let response = HttpResponse::new(201, HeaderMap::new(), r#"{"d":{"Id":"1"}}"#);
        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["d"]["Id"], "1");

        let empty = HttpResponse::new(204, HeaderMap::new(), "");
        assert!(empty.json().is_none());
    }

    #[test]
    fn test_ping_response_serialization() {
        let json = serde_json::to_value(PingResponse::new(10, "0.3.0")).unwrap();
        assert_eq!(json["server_uptime"], 10);
        assert_eq!(json["version"], "0.3.0");
    }
}
