//! Batch operation types
//!
//! The unit of work submitted inside a `$batch` request and the per-operation
//! outcome decoded from the multipart response.

use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Kind of a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    /// Accepted by the type so validation can report it; reads are not batchable.
    Read,
}

impl OperationKind {
    /// HTTP method of the inner request
    pub fn method(&self) -> Method {
        match self {
            Self::Create => Method::POST,
            Self::Update => Method::PATCH,
            Self::Delete => Method::DELETE,
            Self::Read => Method::GET,
        }
    }

    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Create)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Read => "read",
        }
    }
}

/// One operation inside a batch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub kind: OperationKind,
    pub entity_set: String,
    pub entity_key: Option<String>,
    pub payload: Option<serde_json::Value>,
    /// Sent as `If-Match` when present
    pub etag: Option<String>,
}

impl BatchOperation {
    fn new(kind: OperationKind, entity_set: impl Into<String>) -> Self {
        Self {
            kind,
            entity_set: entity_set.into(),
            entity_key: None,
            payload: None,
            etag: None,
        }
    }

    /// Create an entity in `entity_set`
    pub fn create(entity_set: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::new(OperationKind::Create, entity_set)
        }
    }

    /// Update the entity identified by `key`
    pub fn update(
        entity_set: impl Into<String>,
        key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity_key: Some(key.into()),
            payload: Some(payload),
            ..Self::new(OperationKind::Update, entity_set)
        }
    }

    /// Delete the entity identified by `key`
    pub fn delete(entity_set: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity_key: Some(key.into()),
            ..Self::new(OperationKind::Delete, entity_set)
        }
    }

    /// Read operation; only useful to exercise validation
    pub fn read(entity_set: impl Into<String>, key: Option<String>) -> Self {
        Self {
            entity_key: key,
            ..Self::new(OperationKind::Read, entity_set)
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Resource path relative to the service root, e.g. `Orders(1)`
    pub fn resource_path(&self) -> String {
        match self.entity_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                format!("{}{}", self.entity_set, format_entity_key(key))
            }
            _ => self.entity_set.clone(),
        }
    }
}

/// Format an entity key OData-v2 style.
///
/// `(…)` is used verbatim, `k=v` composites, typed literals such as
/// `guid'…'` and already quoted strings are wrapped, integers are bare,
/// anything else is quoted with embedded quotes doubled.
pub fn format_entity_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with('(') && key.ends_with(')') {
        key.to_string()
    } else if key.contains('=') || is_literal(key) {
        format!("({})", key)
    } else if !key.is_empty() && key.parse::<i64>().is_ok() {
        format!("({})", key)
    } else {
        format!("('{}')", key.replace('\'', "''"))
    }
}

/// `'…'` or `prefix'…'` (`guid`, `datetime`, `datetimeoffset`, `time`, `X`, `binary`)
fn is_literal(key: &str) -> bool {
    let Some(quote) = key.find('\'') else {
        return false;
    };
    let (prefix, quoted) = key.split_at(quote);
    quoted.len() >= 2
        && quoted.ends_with('\'')
        && prefix.chars().all(|c| c.is_ascii_alphabetic())
}

/// Outcome of one batch operation, positionally aligned with the submitted list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status_code: u16,
}

impl BatchOperationResult {
    pub fn success(status_code: u16, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            status_code,
        }
    }

    pub fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status_code,
        }
    }
}

/// Ordered results of a batch
pub type BatchResult = Vec<BatchOperationResult>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_methods() {
        assert_eq!(OperationKind::Create.method(), Method::POST);
        assert_eq!(OperationKind::Update.method(), Method::PATCH);
        assert_eq!(OperationKind::Delete.method(), Method::DELETE);
    }

    #[test]
    fn test_key_formatting() {
        assert_eq!(format_entity_key("1"), "(1)");
        assert_eq!(format_entity_key("ABC"), "('ABC')");
        assert_eq!(format_entity_key("O'Brien"), "('O''Brien')");
        assert_eq!(
            format_entity_key("OrderId='1',Item=10"),
            "(OrderId='1',Item=10)"
        );
        assert_eq!(format_entity_key("('X')"), "('X')");
    }

    #[rstest::rstest]
    #[case("guid'0050568d-393c-1ee4-a7e1-6a3c2a5b0b7f'", "(guid'0050568d-393c-1ee4-a7e1-6a3c2a5b0b7f')")]
    #[case("datetime'2024-01-31T00:00:00'", "(datetime'2024-01-31T00:00:00')")]
    #[case("X'0A1B'", "(X'0A1B')")]
    #[case("'ABC'", "('ABC')")]
    #[case("it's", "('it''s')")]
    fn test_typed_literal_keys(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(format_entity_key(key), expected);
    }

    #[test]
    fn test_resource_path() {
        assert_eq!(
            BatchOperation::update("Orders", "1", json!({})).resource_path(),
            "Orders(1)"
        );
        assert_eq!(
            BatchOperation::create("Orders", json!({})).resource_path(),
            "Orders"
        );
    }
}
