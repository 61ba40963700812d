//! Configuration management
//!
//! This module handles loading and managing configuration settings
//! for the protocol engine and the webhook receiver.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    BatchSettings, LoggingSettings, PoolSettings, ReplaySettings, ServerSettings,
    SessionSettings, Settings,
};
