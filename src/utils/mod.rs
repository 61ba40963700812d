//! Small helpers shared by the binary and the library

pub mod version;

pub use version::{get_version, version_banner};
