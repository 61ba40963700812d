//! Replay protection for the inbound webhook
//!
//! Nonces are remembered for a limited time in a store with a hard size
//! ceiling; a background task sweeps expired entries.

pub mod manager;

pub use manager::{NonceEntry, RecordOutcome, ReplayCheck, ReplayProtectionManager, parse_timestamp};
