//! Webhook receiver
//!
//! Axum application exposing the replay-protected webhook endpoint together
//! with ping and pool health endpoints.

pub mod app;
pub mod handlers;

pub use app::{AppState, create_app};
