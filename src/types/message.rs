//! SAP diagnostic message types

use serde::{Deserialize, Serialize};

/// Severity of a SAP message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
    Abort,
}

impl Severity {
    /// Map a SAP severity string to a severity.
    ///
    /// Case-insensitive; accepts full words and the single-letter SAP
    /// convention (`S/I/W/E/A`, plus `X` for abort). Anything else is info.
    pub fn from_sap(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "s" => Self::Success,
            "info" | "i" | "information" => Self::Info,
            "warning" | "w" => Self::Warning,
            "error" | "e" => Self::Error,
            "abort" | "a" | "x" => Self::Abort,
            _ => Self::Info,
        }
    }

    /// Glyph used by the formatter
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Abort => "🛑",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Abort => "abort",
        }
    }

    /// Error or abort
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Abort)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured business or technical message reported by SAP Gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SapMessage {
    /// Message code, e.g. `/IWBEP/CM_MGW_RT/020`; may be empty
    pub code: String,
    /// Message text
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Field path the message refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Technical detail payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SapMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            severity,
            target: None,
            details: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("success", Severity::Success)]
    #[case("S", Severity::Success)]
    #[case("info", Severity::Info)]
    #[case("i", Severity::Info)]
    #[case("Information", Severity::Info)]
    #[case("WARNING", Severity::Warning)]
    #[case("w", Severity::Warning)]
    #[case("error", Severity::Error)]
    #[case("E", Severity::Error)]
    #[case("abort", Severity::Abort)]
    #[case("a", Severity::Abort)]
    #[case("X", Severity::Abort)]
    #[case("fatal", Severity::Info)]
    #[case("", Severity::Info)]
    fn test_severity_mapping(#[case] input: &str, #[case] expected: Severity) {
        assert_eq!(Severity::from_sap(input), expected);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn test_message_builder() {
        let msg = SapMessage::new("ZMSG/001", "Field required", Severity::Error)
            .with_target("SalesOrder/Customer");
        assert_eq!(msg.target.as_deref(), Some("SalesOrder/Customer"));
        assert!(msg.severity.is_failure());
    }
}
