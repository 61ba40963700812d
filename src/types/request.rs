//! Outbound request type definitions
//!
//! Defines the HTTP request handed to the transport, the credentials it is
//! decorated with, and the service target it is addressed to.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use url::Url;

/// HTTP request as seen by the protocol engine
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional request body
    pub body: Option<String>,
}

impl HttpRequest {
    /// Create a request with no headers and no body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Set a header, replacing any previous value. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Apply credentials (basic auth or bearer token)
    pub fn with_credentials(mut self, credentials: &Credentials) -> Self {
        if let Some(value) = credentials.authorization_header()
            && let Ok(value) = HeaderValue::from_str(&value)
        {
            self.headers.insert(AUTHORIZATION, value);
        }
        self
    }

    /// Set a header in place. Returns false if the name or value is not a valid header.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => {
                tracing::warn!("Ignoring invalid header {}", name);
                false
            }
        }
    }

    /// Whether a header is already present (case-insensitive)
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// First value of a header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the method modifies server state
    pub fn is_write(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// Authentication mode supplied by the credentials provider
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthMode {
    /// No authentication
    #[default]
    None,
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// OAuth 2.0 bearer token obtained elsewhere
    OAuth2 { access_token: String },
}

/// Credentials for one SAP system
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    /// Authentication mode
    pub auth: AuthMode,
    /// Accept self-signed or otherwise untrusted certificates
    pub allow_unauthorized_certs: bool,
}

impl Credentials {
    /// Basic auth credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth: AuthMode::Basic {
                username: username.into(),
                password: password.into(),
            },
            allow_unauthorized_certs: false,
        }
    }

    /// Bearer token credentials
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            auth: AuthMode::OAuth2 {
                access_token: access_token.into(),
            },
            allow_unauthorized_certs: false,
        }
    }

    /// `Authorization` header value, if any
    pub fn authorization_header(&self) -> Option<String> {
        match &self.auth {
            AuthMode::None => None,
            AuthMode::Basic { username, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", username, password))
            )),
            AuthMode::OAuth2 { access_token } => Some(format!("Bearer {}", access_token)),
        }
    }
}

/// An OData service on a SAP host, e.g. `https://sap.example.com` + `/sap/opu/odata/sap/API_SALES_ORDER_SRV`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    base_url: Url,
    service_path: String,
}

impl ServiceTarget {
    /// Create a target from a base URL and a service path
    pub fn new(base_url: &str, service_path: &str) -> crate::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.host_str().is_none() {
            return Err(crate::Error::invalid_target(format!(
                "base URL has no host: {}",
                base_url
            )));
        }
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(crate::Error::invalid_target(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let trimmed = service_path.trim().trim_end_matches('/');
        let service_path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        Ok(Self {
            base_url,
            service_path,
        })
    }

    /// Host authority (`host[:port]`), the first half of the session key
    pub fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Service path, the second half of the session key
    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// URL scheme (`http` or `https`)
    pub fn scheme(&self) -> &str {
        self.base_url.scheme()
    }

    /// Service root URL with a trailing slash
    pub fn service_root(&self) -> String {
        format!(
            "{}{}/",
            self.base_url.as_str().trim_end_matches('/'),
            self.service_path
        )
    }

    /// `$batch` endpoint URL
    pub fn batch_url(&self) -> String {
        format!("{}$batch", self.service_root())
    }

    /// URL of a resource relative to the service root
    pub fn resource_url(&self, resource: &str) -> String {
        format!("{}{}", self.service_root(), resource.trim_start_matches('/'))
    }
}

impl std::fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.host(), self.service_path)
    }
}
