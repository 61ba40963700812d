//! HTTP transport seam
//!
//! The protocol engine never talks to the network directly: requests go
//! through an injected [`HttpTransport`]. [`ReqwestTransport`] is the
//! production implementation backed by the shared connection pool.

use crate::{
    Result,
    pool::{ConnectionPoolManager, PoolConfigUpdate, Scheme},
    types::{HttpRequest, HttpResponse},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Executes one HTTP exchange. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by the pooled `reqwest` clients
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    pool: Arc<ConnectionPoolManager>,
}

impl ReqwestTransport {
    /// Create a transport drawing connections from `pool`
    pub fn new(pool: Arc<ConnectionPoolManager>) -> Self {
        Self { pool }
    }

    /// Toggle TLS certificate verification on the shared pool.
    ///
    /// The pool holds a single configuration, so this reconfigures it for
    /// every caller; existing connections are unaffected.
    pub fn with_tls_verification(self, verify: bool) -> Result<Self> {
        self.pool.update_config(PoolConfigUpdate {
            reject_unauthorized: Some(verify),
            ..Default::default()
        })?;
        Ok(self)
    }

    pub fn pool(&self) -> &Arc<ConnectionPoolManager> {
        &self.pool
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let scheme = Scheme::from_url(&request.url)?;
        let lease = self.pool.acquire(scheme).await?;

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = lease
            .client()
            .request(request.method.clone(), &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                lease.discard();
                return Err(crate::Error::transport(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                lease.discard();
                return Err(crate::Error::transport(e.to_string()));
            }
        };

        tracing::debug!(status, bytes = body.len(), "Received response");
        Ok(HttpResponse::new(status, headers, body))
    }
}
