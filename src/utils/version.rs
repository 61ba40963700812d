//! Version information

/// Crate version as set at build time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the crate version
pub fn get_version() -> &'static str {
    VERSION
}

/// Version string used in the startup banner
pub fn version_banner() -> String {
    format!("{} v{}", env!("CARGO_PKG_NAME"), VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(get_version(), env!("CARGO_PKG_VERSION"));
        assert!(version_banner().starts_with("sap-odata-gateway v"));
    }
}
