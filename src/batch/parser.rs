//! `$batch` response decoding
//!
//! Splits a multipart response into its parts, descends one level into
//! changesets, and maps every inner HTTP response to a
//! [`BatchOperationResult`] in wire order.
//!
//! Malformed input never fails: a part only counts once the delimiter that
//! closes it has been seen, so a truncated body yields fewer results than
//! operations and callers must treat the shortfall as a partial failure.

use super::codec::BuiltBatch;
use crate::{
    message,
    types::{BatchOperationResult, BatchResult},
};
use serde_json::Value;
use tracing::warn;

/// A top-level response part: a changeset or a standalone response
#[derive(Debug, Clone, PartialEq)]
enum ResponseUnit {
    ChangeSet(Vec<BatchOperationResult>),
    Single(BatchOperationResult),
}

/// Boundary parameter of a `multipart/mixed` content type
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|b| !b.is_empty())
    })
}

/// Decode a multipart `$batch` response into results in wire order
pub fn parse_batch_response(raw: &str, boundary: &str) -> BatchResult {
    parse_units(raw, boundary)
        .into_iter()
        .flat_map(|unit| match unit {
            ResponseUnit::ChangeSet(results) => results,
            ResponseUnit::Single(result) => vec![result],
        })
        .collect()
}

/// Decode the response to `built`, keeping results aligned with its operations.
///
/// SAP answers a failed changeset with one error response in place of the
/// changeset; that failure is repeated for every operation it covered.
pub fn parse_for_request(built: &BuiltBatch, raw: &str) -> BatchResult {
    let units = parse_units(raw, &built.boundary);

    if built.changeset_boundary.is_none() {
        return units
            .into_iter()
            .flat_map(|unit| match unit {
                ResponseUnit::ChangeSet(results) => results,
                ResponseUnit::Single(result) => vec![result],
            })
            .collect();
    }

    let mut results = Vec::with_capacity(built.operation_count);
    for unit in units {
        match unit {
            ResponseUnit::ChangeSet(mut inner) => results.append(&mut inner),
            ResponseUnit::Single(result) if !result.success => {
                let remaining = built.operation_count.saturating_sub(results.len());
                results.extend(std::iter::repeat_n(result, remaining));
            }
            ResponseUnit::Single(result) => results.push(result),
        }
        if results.len() >= built.operation_count {
            break;
        }
    }

    if results.len() < built.operation_count {
        warn!(
            "Batch response covered {} of {} operations",
            results.len(),
            built.operation_count
        );
    }
    results.truncate(built.operation_count);
    results
}

fn parse_units(raw: &str, boundary: &str) -> Vec<ResponseUnit> {
    let normalized = raw.replace("\r\n", "\n");

    let Some(boundary) = resolve_boundary(&normalized, boundary) else {
        warn!("Batch response contains no multipart delimiter");
        return Vec::new();
    };

    let outer = split_parts(&normalized, &boundary);
    let mut units: Vec<ResponseUnit> = outer.parts.into_iter().filter_map(parse_unit).collect();

    // A changeset cut off mid-way still yields its completed responses
    if let Some(tail) = outer.truncated {
        let (headers, body) = split_head(tail);
        if let Some(changeset) = changeset_boundary(&headers) {
            units.push(ResponseUnit::ChangeSet(parse_changeset(body, &changeset)));
        }
    }
    units
}

fn parse_unit(part: &str) -> Option<ResponseUnit> {
    let (headers, body) = split_head(part);
    match changeset_boundary(&headers) {
        Some(changeset) => Some(ResponseUnit::ChangeSet(parse_changeset(body, &changeset))),
        None => parse_http_response(body).map(ResponseUnit::Single),
    }
}

fn parse_changeset(body: &str, boundary: &str) -> Vec<BatchOperationResult> {
    split_parts(body, boundary)
        .parts
        .into_iter()
        .filter_map(|sub| {
            let (_, inner) = split_head(sub);
            parse_http_response(inner)
        })
        .collect()
}

/// The caller's boundary when present in the body, else the first delimiter seen
fn resolve_boundary(body: &str, boundary: &str) -> Option<String> {
    let delimiter = format!("--{}", boundary);
    if !boundary.is_empty() && body.lines().any(|line| line.trim_end() == delimiter) {
        return Some(boundary.to_string());
    }

    let sniffed = body
        .lines()
        .map(str::trim_end)
        .find_map(|line| line.strip_prefix("--"))
        .map(|b| b.trim_end_matches("--").to_string())
        .filter(|b| !b.is_empty());

    if let Some(found) = &sniffed {
        tracing::debug!("Using response boundary {} instead of {}", found, boundary);
    }
    sniffed
}

struct Parts<'a> {
    parts: Vec<&'a str>,
    /// Content after the last delimiter when the closing delimiter never came
    truncated: Option<&'a str>,
}

/// Parts enclosed by `--boundary` delimiters. A part still open at the end of input is not among them.
fn split_parts<'a>(body: &'a str, boundary: &str) -> Parts<'a> {
    let delimiter = format!("--{}", boundary);
    let closing = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut start: Option<usize> = None;
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == delimiter || trimmed == closing {
            if let Some(begin) = start {
                parts.push(&body[begin..offset]);
            }
            if trimmed == closing {
                return Parts {
                    parts,
                    truncated: None,
                };
            }
            start = Some(offset + line.len());
        }
        offset += line.len();
    }

    let truncated = start
        .map(|begin| &body[begin..])
        .filter(|tail| !tail.trim().is_empty());
    if let Some(tail) = truncated {
        warn!("Batch part truncated after {} bytes", tail.len());
    }
    Parts { parts, truncated }
}

/// Split a MIME entity into header lines and body at the first blank line
fn split_head(entity: &str) -> (Vec<(String, String)>, &str) {
    if let Some(body) = entity.strip_prefix('\n') {
        return (Vec::new(), body);
    }
    let (head, body) = match entity.find("\n\n") {
        Some(idx) => (&entity[..idx], &entity[idx + 2..]),
        None => (entity, ""),
    };

    let headers = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    (headers, body)
}

fn content_type(headers: &[(String, String)]) -> Option<&str> {
    headers
        .iter()
        .find(|(name, _)| name == "content-type")
        .map(|(_, value)| value.as_str())
}

fn changeset_boundary(headers: &[(String, String)]) -> Option<String> {
    content_type(headers)
        .filter(|ct| ct.to_ascii_lowercase().starts_with("multipart/mixed"))
        .and_then(boundary_from_content_type)
}

/// Parse an `application/http` framed response: status line, headers, body
fn parse_http_response(framed: &str) -> Option<BatchOperationResult> {
    let framed = framed.trim_start();
    let (status_line, rest) = framed.split_once('\n').unwrap_or((framed, ""));

    let mut fields = status_line.split_whitespace();
    if !fields.next()?.starts_with("HTTP/") {
        warn!("Skipping batch part without status line: {:?}", status_line);
        return None;
    }
    let status: u16 = fields.next()?.parse().ok()?;
    let reason = fields.collect::<Vec<_>>().join(" ");

    let (_, body) = split_head(rest);
    let body = body.trim();

    if (200..300).contains(&status) {
        return Some(BatchOperationResult::success(status, payload(body)));
    }

    let error = message::parse_error_body_str(body)
        .into_iter()
        .find(|m| !m.message.is_empty())
        .map(|m| m.message)
        .or_else(|| body_excerpt(body))
        .unwrap_or_else(|| format!("HTTP {} {}", status, reason).trim().to_string());
    Some(BatchOperationResult::failure(status, error))
}

const MAX_ERROR_EXCERPT: usize = 200;

/// Readable error text from a non-JSON body.
///
/// XML error documents yield their `<message>` text; other markup has its
/// tags stripped. The result is cut at [`MAX_ERROR_EXCERPT`] characters.
fn body_excerpt(body: &str) -> Option<String> {
    let text = if body.starts_with('<') {
        element_text(body, "message").unwrap_or_else(|| strip_tags(body))
    } else {
        body.to_string()
    };
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= MAX_ERROR_EXCERPT {
        return Some(text);
    }
    let cut: String = text.chars().take(MAX_ERROR_EXCERPT).collect();
    Some(format!("{}...", cut))
}

/// Text content of the first `<name ...>` element
fn element_text(markup: &str, name: &str) -> Option<String> {
    let open = format!("<{}", name);
    let mut rest = markup;
    while let Some(at) = rest.find(&open) {
        let after = &rest[at + open.len()..];
        // Skip elements that merely share the prefix, e.g. `<messages>`
        if after.starts_with(['>', ' ', '\t', '\r', '\n']) {
            let content = &after[after.find('>')? + 1..];
            let end = content.find(&format!("</{}", name))?;
            return Some(content[..end].trim().to_string()).filter(|t| !t.is_empty());
        }
        rest = after;
    }
    None
}

fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// JSON payload with the OData v2 `{"d": ...}` envelope removed
fn payload(body: &str) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(body).ok()?;
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("d") => map.remove("d"),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::codec::{BatchRequest, build_batch_request};
    use crate::types::BatchOperation;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CHANGESET_RESPONSE: &str = "--batchresponse_1\r\n\
Content-Type: multipart/mixed; boundary=changesetresponse_9\r\n\
\r\n\
--changesetresponse_9\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 201 Created\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"d\":{\"Id\":\"3\"}}\r\n\
--changesetresponse_9\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 204 No Content\r\n\
\r\n\
\r\n\
--changesetresponse_9\r\n\
Content-Type: application/http\r\n\
Content-Transfer-Encoding: binary\r\n\
\r\n\
HTTP/1.1 204 No Content\r\n\
\r\n\
\r\n\
--changesetresponse_9--\r\n\
\r\n\
--batchresponse_1--\r\n";

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/mixed; boundary=batch_1").as_deref(),
            Some("batch_1")
        );
        assert_eq!(
            boundary_from_content_type("multipart/mixed; Boundary=\"abc\"").as_deref(),
            Some("abc")
        );
        assert_eq!(boundary_from_content_type("application/json"), None);
    }

    #[test]
    fn test_parse_changeset_response() {
        let results = parse_batch_response(CHANGESET_RESPONSE, "batchresponse_1");

        assert_eq!(
            results,
            vec![
                BatchOperationResult::success(201, Some(json!({"Id": "3"}))),
                BatchOperationResult::success(204, None),
                BatchOperationResult::success(204, None),
            ]
        );
    }

    #[test]
    fn test_parse_sniffs_server_boundary() {
        let results = parse_batch_response(CHANGESET_RESPONSE, "batch_from_request");
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_parse_plain_parts_with_failure() {
        let raw = "--b\n\
Content-Type: application/http\n\
\n\
HTTP/1.1 200 OK\n\
Content-Type: application/json\n\
\n\
{\"d\":{\"results\":[]}}\n\
--b\n\
Content-Type: application/http\n\
\n\
HTTP/1.1 400 Bad Request\n\
Content-Type: application/json\n\
\n\
{\"error\":{\"code\":\"/IWBEP/CM_MGW_RT/020\",\"message\":{\"lang\":\"en\",\"value\":\"Invalid key\"}}}\n\
--b\n\
Content-Type: application/http\n\
\n\
HTTP/1.1 404 Not Found\n\
\n\
\n\
--b--\n";

        let results = parse_batch_response(raw, "b");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].data, Some(json!({"results": []})));
        assert_eq!(
            results[1],
            BatchOperationResult::failure(400, "Invalid key")
        );
        assert_eq!(results[2], BatchOperationResult::failure(404, "HTTP 404 Not Found"));
    }

    #[test]
    fn test_truncated_response_returns_complete_parts_only() {
        // Body ends inside the third changeset response
        let cut = CHANGESET_RESPONSE
            .find("HTTP/1.1 204 No Content\r\n\r\n\r\n--changesetresponse_9--")
            .unwrap();
        let truncated = &CHANGESET_RESPONSE[..cut + 10];

        let results = parse_batch_response(truncated, "batchresponse_1");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status_code, 201);

        // Outer part closed but changeset truncated after the second response
        let second_end = CHANGESET_RESPONSE.rfind("--changesetresponse_9\r\n").unwrap();
        let mut partial = CHANGESET_RESPONSE[..second_end].to_string();
        partial.push_str("--changesetresponse_9\r\nContent-Type: application/http\r\n\r\nHTTP/1.1 20");
        partial.push_str("\r\n--batchresponse_1--\r\n");

        let results = parse_batch_response(&partial, "batchresponse_1");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn test_xml_error_body_uses_message_text() {
        let framed = "HTTP/1.1 400 Bad Request\r\nContent-Type: application/xml\r\n\r\n\
<?xml version=\"1.0\" encoding=\"utf-8\"?><error xmlns=\"http://schemas.microsoft.com/ado/2007/08/dataservices/metadata\">\
<code>/IWBEP/CM_MGW_RT/020</code><message xml:lang=\"en\">Order 42 is locked</message></error>";

        let result = parse_http_response(framed).unwrap();
        assert_eq!(result.status_code, 400);
        assert_eq!(result.error.as_deref(), Some("Order 42 is locked"));
    }

    #[test]
    fn test_html_error_body_is_stripped_and_truncated() {
        let filler = "x".repeat(500);
        let framed = format!(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/html\r\n\r\n\
<html><head><title>500 Internal Server Error</title></head><body><p>{}</p></body></html>",
            filler
        );

        let result = parse_http_response(&framed).unwrap();
        let error = result.error.unwrap();
        assert!(error.starts_with("500 Internal Server Error"));
        assert!(!error.contains('<'));
        assert!(error.chars().count() <= MAX_ERROR_EXCERPT + 3);
        assert!(error.ends_with("..."));
    }

    #[test]
    fn test_missing_boundary_yields_empty() {
        assert!(parse_batch_response("<html>Gateway timeout</html>", "batch_1").is_empty());
        assert!(parse_batch_response("", "batch_1").is_empty());
    }

    #[test]
    fn test_failed_changeset_fans_out() {
        let ops = vec![
            BatchOperation::create("Orders", json!({})),
            BatchOperation::delete("Orders", "2"),
        ];
        let built = build_batch_request(&BatchRequest::new(ops, "/x")).unwrap();

        let raw = format!(
            "--{b}\r\n\
Content-Type: application/http\r\n\
\r\n\
HTTP/1.1 400 Bad Request\r\n\
Content-Type: application/json\r\n\
\r\n\
{{\"error\":{{\"code\":\"SY/530\",\"message\":{{\"value\":\"Order locked\"}}}}}}\r\n\
--{b}--\r\n",
            b = built.boundary
        );

        let results = parse_for_request(&built, &raw);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success && r.status_code == 400));
        assert_eq!(results[1].error.as_deref(), Some("Order locked"));
    }

    #[test]
    fn test_parse_for_request_keeps_changeset_results() {
        let ops = vec![
            BatchOperation::create("Orders", json!({})),
            BatchOperation::update("Orders", "1", json!({})),
            BatchOperation::delete("Orders", "2"),
        ];
        let built = build_batch_request(&BatchRequest::new(ops, "/x")).unwrap();

        let results = parse_for_request(&built, CHANGESET_RESPONSE);
        assert_eq!(
            results.iter().map(|r| r.status_code).collect::<Vec<_>>(),
            vec![201, 204, 204]
        );
    }
}
