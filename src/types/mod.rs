//! Type definitions
//!
//! This module contains the main data structures shared by the transport,
//! session, message and batch layers.

pub mod batch;
pub mod message;
pub mod request;
pub mod response;

pub use batch::{
    BatchOperation, BatchOperationResult, BatchResult, OperationKind, format_entity_key,
};
pub use message::{SapMessage, Severity};
pub use request::{AuthMode, Credentials, HttpRequest, ServiceTarget};
pub use response::{ErrorResponse, HealthResponse, HttpResponse, PingResponse, WebhookAck};
