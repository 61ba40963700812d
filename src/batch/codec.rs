//! `$batch` request encoding
//!
//! Serializes an ordered operation list into one `multipart/mixed` body,
//! optionally wrapped in a single changeset so SAP applies it atomically.

use crate::{
    Result,
    types::{BatchOperation, OperationKind},
};
use uuid::Uuid;

const CRLF: &str = "\r\n";

/// An ordered set of operations destined for one `$batch` POST
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub operations: Vec<BatchOperation>,
    /// Service path the `$batch` endpoint lives under
    pub service_path: String,
    /// Wrap every operation in one changeset
    pub use_change_set: bool,
}

impl BatchRequest {
    pub fn new(operations: Vec<BatchOperation>, service_path: impl Into<String>) -> Self {
        Self {
            operations,
            service_path: service_path.into(),
            use_change_set: true,
        }
    }

    pub fn with_change_set(mut self, use_change_set: bool) -> Self {
        self.use_change_set = use_change_set;
        self
    }
}

/// An encoded batch, ready to submit
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltBatch {
    pub body: String,
    /// Outer MIME boundary, needed again to decode the response
    pub boundary: String,
    /// `multipart/mixed; boundary=...`
    pub content_type: String,
    pub changeset_boundary: Option<String>,
    pub operation_count: usize,
    pub service_path: String,
}

impl BuiltBatch {
    /// Path of the `$batch` endpoint relative to the host
    pub fn batch_path(&self) -> String {
        format!("{}/$batch", self.service_path.trim_end_matches('/'))
    }
}

/// Check an operation list before anything is sent.
///
/// Returns every problem found; an empty list means the operations are valid.
pub fn validate_operations(operations: &[BatchOperation]) -> Vec<String> {
    if operations.is_empty() {
        return vec!["No operations provided for batch".to_string()];
    }

    if operations.iter().all(|op| op.kind == OperationKind::Read) {
        return vec!["Batch contains only read operations; reads are not batchable".to_string()];
    }

    let mut errors = Vec::new();
    for (index, op) in operations.iter().enumerate() {
        let position = index + 1;

        if op.entity_set.trim().is_empty() {
            errors.push(format!("Operation {}: entity set is required", position));
        }

        if op.kind == OperationKind::Read {
            errors.push(format!(
                "Operation {}: read operations are not batchable",
                position
            ));
            continue;
        }

        if op.kind.requires_key()
            && op
                .entity_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            errors.push(format!(
                "Operation {} ({}): entity key is required",
                position,
                op.kind.as_str()
            ));
        }
    }
    errors
}

/// Partition into order-preserving chunks of at most `batch_size` operations
pub fn split_into_batches(
    operations: &[BatchOperation],
    batch_size: usize,
) -> Vec<Vec<BatchOperation>> {
    operations
        .chunks(batch_size.max(1))
        .map(<[BatchOperation]>::to_vec)
        .collect()
}

/// Encode a batch request body.
///
/// Fails with [`crate::Error::Validation`] when the operations are invalid.
pub fn build_batch_request(request: &BatchRequest) -> Result<BuiltBatch> {
    let errors = validate_operations(&request.operations);
    if !errors.is_empty() {
        return Err(crate::Error::validation(errors));
    }

    let boundary = format!("batch_{}", Uuid::new_v4());
    let mut body = String::new();

    let changeset_boundary = if request.use_change_set {
        let changeset = format!("changeset_{}", Uuid::new_v4());

        body.push_str(&format!("--{}{}", boundary, CRLF));
        body.push_str(&format!(
            "Content-Type: multipart/mixed; boundary={}{}",
            changeset, CRLF
        ));
        body.push_str(CRLF);

        for (index, op) in request.operations.iter().enumerate() {
            body.push_str(&format!("--{}{}", changeset, CRLF));
            write_operation_part(&mut body, op, Some(index + 1))?;
        }
        body.push_str(&format!("--{}--{}", changeset, CRLF));
        body.push_str(CRLF);

        Some(changeset)
    } else {
        for op in &request.operations {
            body.push_str(&format!("--{}{}", boundary, CRLF));
            write_operation_part(&mut body, op, None)?;
        }
        None
    };

    body.push_str(&format!("--{}--{}", boundary, CRLF));

    tracing::debug!(
        operations = request.operations.len(),
        changeset = changeset_boundary.is_some(),
        bytes = body.len(),
        "Built batch request"
    );

    Ok(BuiltBatch {
        content_type: format!("multipart/mixed; boundary={}", boundary),
        body,
        boundary,
        changeset_boundary,
        operation_count: request.operations.len(),
        service_path: request.service_path.clone(),
    })
}

fn write_operation_part(
    body: &mut String,
    op: &BatchOperation,
    content_id: Option<usize>,
) -> Result<()> {
    body.push_str(&format!("Content-Type: application/http{}", CRLF));
    body.push_str(&format!("Content-Transfer-Encoding: binary{}", CRLF));
    if let Some(id) = content_id {
        body.push_str(&format!("Content-ID: {}{}", id, CRLF));
    }
    body.push_str(CRLF);

    body.push_str(&format!(
        "{} {} HTTP/1.1{}",
        op.kind.method(),
        op.resource_path(),
        CRLF
    ));
    body.push_str(&format!("Accept: application/json{}", CRLF));
    if let Some(etag) = op.etag.as_deref() {
        body.push_str(&format!("If-Match: {}{}", etag, CRLF));
    }

    match (&op.kind, &op.payload) {
        (OperationKind::Create | OperationKind::Update, Some(payload)) => {
            let json = serde_json::to_string(payload).map_err(|e| {
                crate::Error::batch_encoding(format!("payload for {}: {}", op.entity_set, e))
            })?;
            body.push_str(&format!("Content-Type: application/json{}", CRLF));
            body.push_str(&format!("Content-Length: {}{}", json.len(), CRLF));
            body.push_str(CRLF);
            body.push_str(&json);
            body.push_str(CRLF);
        }
        _ => {
            body.push_str(CRLF);
        }
    }
    body.push_str(CRLF);
    Ok(())
}
