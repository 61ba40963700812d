//! Error handling for the OData protocol engine
//!
//! This module defines error types and handling patterns used throughout the crate.

pub mod types;

pub use types::{Error, Result, sanitize_message};
