//! Session management for SAP Gateway services
//!
//! This module tracks the per-service session state SAP requires for write
//! operations: affinity cookies, the `SAP-ContextId` and the CSRF token.

pub mod cookies;
pub mod manager;
pub mod state;

pub use cookies::{Cookie, CookieJar};
pub use manager::{RequestOptions, SessionStateManager};
pub use state::{Session, SessionKey, SessionPhase, SessionStatus};
