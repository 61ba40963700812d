//! SAP OData Gateway - Rust Implementation
//!
//! A protocol engine for SAP Gateway OData services over plain HTTP. It
//! implements the stateful conventions SAP layers on top of OData without a
//! vendor SDK: CSRF-gated writes, session cookie affinity, the
//! `SAP-ContextId`, structured `sap-message` diagnostics and the `$batch`
//! multipart wire format.
//!
//! # Architecture
//!
//! - **Connection pool** ([`pool`]): shared TCP/TLS reuse with telemetry
//! - **Message extraction** ([`message`]): SAP diagnostics from headers and bodies
//! - **Session state** ([`session`]): per-service cookies, context id and CSRF token
//! - **Batch codec** ([`batch`]): `multipart/mixed` encoding and decoding
//! - **Replay protection** ([`replay`]): nonce store for the inbound webhook
//!
//! [`client::ODataClient`] wires these together for one service, and
//! [`server`] exposes the webhook receiver run by the `sap-odata-webhook`
//! binary.
//!
//! # Usage
//!
//! ```bash
//! sap-odata-webhook --port 5678 --host 0.0.0.0
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sap_odata_gateway::{
//!     ODataClient, SessionStateManager, Settings,
//!     pool::ConnectionPoolManager,
//!     transport::{HttpTransport, ReqwestTransport},
//!     types::{BatchOperation, Credentials, ServiceTarget},
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::default();
//! let pool = Arc::new(ConnectionPoolManager::new(settings.pool.clone()));
//! let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(pool));
//! let sessions = Arc::new(SessionStateManager::from_settings(
//!     transport.clone(),
//!     &settings.session,
//! ));
//! sessions.start_cleanup(settings.session.cleanup_interval());
//!
//! let client = ODataClient::new(
//!     ServiceTarget::new("https://sap.example.com", "/sap/opu/odata/sap/ZSALES_SRV")?,
//!     Credentials::basic("user", "secret"),
//!     sessions,
//!     transport,
//! )
//! .with_batch_settings(settings.batch.clone());
//!
//! let results = client
//!     .execute_batch(vec![
//!         BatchOperation::create("Orders", serde_json::json!({"Customer": "C1"})),
//!         BatchOperation::delete("Orders", "42"),
//!     ])
//!     .await?;
//! for result in results {
//!     println!("{} {}", result.status_code, result.success);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod pool;
pub mod replay;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::ODataClient;
pub use config::Settings;
pub use error::{Error, Result};
pub use pool::ConnectionPoolManager;
pub use replay::ReplayProtectionManager;
pub use session::SessionStateManager;
pub use types::{BatchOperation, BatchOperationResult, BatchResult, SapMessage, Severity};
