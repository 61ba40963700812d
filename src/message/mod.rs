//! SAP message extraction
//!
//! Normalizes the two SAP error-reporting channels, the URL-encoded JSON
//! `sap-message` response header and the OData `error` object in a JSON
//! body, into one ordered list of [`SapMessage`](crate::types::SapMessage).
//!
//! ```rust
//! use sap_odata_gateway::message::{format_messages, parse_sap_message_header};
//!
//! let extraction = parse_sap_message_header(
//!     "%7B%22message%22%3A%22Field%20required%22%2C%22severity%22%3A%22error%22%7D",
//! );
//! assert_eq!(format_messages(&extraction.messages), "❌ Field required");
//! ```

pub mod descriptions;
pub mod extractor;

pub use descriptions::get_error_description;
pub use extractor::{
    Extraction, SAP_MESSAGE_HEADER, extract_all, format_messages, is_business_error,
    is_technical_error, map_severity, message_class, parse_error_body, parse_error_body_str,
    parse_sap_message_header,
};
