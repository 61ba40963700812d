//! Extraction of SAP messages from the `sap-message` header and OData error bodies
//!
//! Both channels are diagnostic: nothing here returns an error. A malformed
//! header yields an empty [`Extraction`] carrying the reason, and a body
//! without an `error` object yields no messages.

use crate::types::{HttpResponse, SapMessage, Severity};
use serde_json::Value;
use tracing::warn;

/// Response header carrying SAP messages
pub const SAP_MESSAGE_HEADER: &str = "sap-message";

/// Message classes raised by application logic
const BUSINESS_CLASSES: &[&str] = &[
    "BUSI_EXCEPTION",
    "CX_MGW_BUSI",
    "/IWBEP/CM_MGW_RT",
    "/BOBF/",
    "BAPI",
];

/// Message classes raised by the Gateway runtime or ABAP kernel
const TECHNICAL_CLASSES: &[&str] = &[
    "TECH_EXCEPTION",
    "CX_MGW_TECH",
    "/IWFND/",
    "/IWCOR/",
    "CX_SY_",
];

/// Result of parsing the `sap-message` header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub messages: Vec<SapMessage>,
    /// Why the header could not be parsed, if it could not
    pub diagnostic: Option<String>,
}

impl Extraction {
    fn failed(reason: String) -> Self {
        warn!("Ignoring malformed sap-message header: {}", reason);
        Self {
            messages: Vec::new(),
            diagnostic: Some(reason),
        }
    }
}

/// Map a SAP severity string; see [`Severity::from_sap`].
pub fn map_severity(value: &str) -> Severity {
    Severity::from_sap(value)
}

/// Parse a raw `sap-message` header value (URL-encoded JSON).
pub fn parse_sap_message_header(raw: &str) -> Extraction {
    let decoded = match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => return Extraction::failed(format!("invalid URL encoding: {}", e)),
    };

    let value: Value = match serde_json::from_str(&decoded) {
        Ok(value) => value,
        Err(e) => return Extraction::failed(format!("invalid JSON: {}", e)),
    };

    let Some(object) = value.as_object() else {
        return Extraction::failed("expected a JSON object".to_string());
    };

    let mut messages = Vec::new();
    if object.contains_key("message") {
        messages.push(message_from_entry(&value, Severity::Info));
    }
    if let Some(details) = object.get("details").and_then(Value::as_array) {
        messages.extend(
            details
                .iter()
                .filter(|d| d.is_object())
                .map(|d| message_from_entry(d, Severity::Info)),
        );
    }

    Extraction {
        messages,
        diagnostic: None,
    }
}

/// Parse an OData error body (`{"error": {...}}`).
///
/// Reads `error.message`, `error.code`, `error.innererror.errordetails[]` and
/// `error.details[]`; severities default to error.
pub fn parse_error_body(body: &Value) -> Vec<SapMessage> {
    let Some(error) = body.get("error").filter(|e| e.is_object()) else {
        return Vec::new();
    };

    let mut messages = Vec::new();

    let text = error.get("message").map(message_text).unwrap_or_default();
    let code = string_field(error, "code");
    if !text.is_empty() || !code.is_empty() {
        let mut msg = SapMessage::new(code, text, Severity::Error);
        if let Some(target) = non_empty(error, "target") {
            msg = msg.with_target(target);
        }
        if let Some(inner) = error.get("innererror").and_then(Value::as_object) {
            let technical: serde_json::Map<String, Value> = inner
                .iter()
                .filter(|(k, _)| k.as_str() != "errordetails")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if !technical.is_empty() {
                msg = msg.with_details(Value::Object(technical));
            }
        }
        messages.push(msg);
    }

    let inner_details = error
        .get("innererror")
        .and_then(|inner| inner.get("errordetails"))
        .and_then(Value::as_array);
    let odata_details = error.get("details").and_then(Value::as_array);

    for list in [inner_details, odata_details].into_iter().flatten() {
        messages.extend(
            list.iter()
                .filter(|d| d.is_object())
                .map(|d| message_from_entry(d, Severity::Error)),
        );
    }

    messages
}

/// Parse a raw body string; non-JSON bodies yield no messages.
pub fn parse_error_body_str(body: &str) -> Vec<SapMessage> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => parse_error_body(&value),
        Err(_) => Vec::new(),
    }
}

/// All messages carried by a response: header messages first, then body messages.
pub fn extract_all(response: &HttpResponse) -> Vec<SapMessage> {
    let mut messages = response
        .header(SAP_MESSAGE_HEADER)
        .map(|raw| parse_sap_message_header(raw).messages)
        .unwrap_or_default();
    messages.extend(parse_error_body_str(&response.body));
    messages
}

/// Message class of a code: `/NAMESPACE/TYPE` for namespaced codes, the first
/// segment otherwise. The trailing message number is dropped.
pub fn message_class(code: &str) -> String {
    let code = code.trim();
    match code.strip_prefix('/') {
        Some(rest) => {
            let segments: Vec<&str> = rest.splitn(3, '/').collect();
            match segments.as_slice() {
                [namespace, kind, ..] => format!("/{}/{}", namespace, kind),
                [namespace] => format!("/{}", namespace),
                [] => String::new(),
            }
        }
        None => code.split('/').next().unwrap_or_default().to_string(),
    }
}

/// Whether the code belongs to a known business exception class
pub fn is_business_error(code: &str) -> bool {
    class_matches(code, BUSINESS_CLASSES)
}

/// Whether the code belongs to a known technical exception class
pub fn is_technical_error(code: &str) -> bool {
    class_matches(code, TECHNICAL_CLASSES)
}

fn class_matches(code: &str, classes: &[&str]) -> bool {
    let class = message_class(code).to_ascii_uppercase();
    !class.is_empty() && classes.iter().any(|known| class.contains(known))
}

/// Render messages for humans.
///
/// One message: `❌ [CODE] text (Target: field)`. Several messages are
/// numbered `1. …` and joined with newlines. Empty code or target parts are
/// omitted.
pub fn format_messages(messages: &[SapMessage]) -> String {
    match messages {
        [] => String::new(),
        [single] => format_one(single),
        many => many
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. {}", i + 1, format_one(m)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_one(message: &SapMessage) -> String {
    let mut out = String::from(message.severity.glyph());
    if !message.code.is_empty() {
        out.push_str(&format!(" [{}]", message.code));
    }
    out.push(' ');
    out.push_str(&message.message);
    if let Some(target) = message.target.as_deref().filter(|t| !t.is_empty()) {
        out.push_str(&format!(" (Target: {})", target));
    }
    out
}

fn message_from_entry(entry: &Value, default_severity: Severity) -> SapMessage {
    let severity = entry
        .get("severity")
        .and_then(Value::as_str)
        .map(map_severity)
        .unwrap_or(default_severity);

    let mut msg = SapMessage::new(
        string_field(entry, "code"),
        entry.get("message").map(message_text).unwrap_or_default(),
        severity,
    );
    msg.target = non_empty(entry, "target").or_else(|| non_empty(entry, "propertyref"));

    if let Some(object) = entry.as_object() {
        let extra: serde_json::Map<String, Value> = object
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    "code" | "message" | "severity" | "target" | "propertyref" | "details"
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !extra.is_empty() {
            msg.details = Some(Value::Object(extra));
        }
    }

    msg
}

/// `message` may be a plain string or `{ "lang": "en", "value": "..." }`
fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
