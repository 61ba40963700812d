//! OData `$batch` wire format
//!
//! [`build_batch_request`] encodes an operation list into one
//! `multipart/mixed` body; [`parse_batch_response`] and [`parse_for_request`]
//! decode the server's multipart answer into results that line up with the
//! submitted operations by position.

pub mod codec;
pub mod parser;

pub use codec::{BatchRequest, BuiltBatch, build_batch_request, split_into_batches, validate_operations};
pub use parser::{boundary_from_content_type, parse_batch_response, parse_for_request};
