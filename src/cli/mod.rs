//! Command-line entry points

pub mod server;

pub use server::{ServerArgs, init_logging, run_server_mode};
