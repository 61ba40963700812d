//! Human-readable explanations for common SAP Gateway message codes

use super::extractor::{is_business_error, is_technical_error};

/// Code → explanation. Exact matches are tried first, then prefixes in table order.
const ERROR_DESCRIPTIONS: &[(&str, &str)] = &[
    (
        "/IWBEP/CM_MGW_RT/004",
        "Resource not found for segment. Check the entity set name and the key predicate.",
    ),
    (
        "/IWBEP/CM_MGW_RT/020",
        "The requested entity does not exist. Verify the key values.",
    ),
    (
        "/IWBEP/CM_MGW_RT/021",
        "The operation is not implemented by the service's data provider for this entity set.",
    ),
    (
        "/IWBEP/CM_MGW_RT/022",
        "The request payload could not be deserialized. Check property names and value types.",
    ),
    (
        "/IWBEP/CM_MGW_RT/106",
        "Invalid key predicate. Check the number, names and types of key properties.",
    ),
    (
        "/IWBEP/CM_MGW_RT/109",
        "The entity was modified by someone else (ETag mismatch). Reload it and retry.",
    ),
    (
        "/IWFND/CM_BEC/026",
        "The backend system could not be reached. Check the system alias and RFC destination.",
    ),
    (
        "/IWFND/CM_CONSUMER/101",
        "Service not found or not activated. Activate it in transaction /IWFND/MAINT_SERVICE.",
    ),
    (
        "/IWFND/CM_MGW/004",
        "The service metadata could not be loaded. Clear the Gateway metadata cache.",
    ),
    (
        "/IWFND/CM_MGW/096",
        "The changeset was rolled back because one of its operations failed.",
    ),
    (
        "/IWFND/CM_MGW_RT/",
        "SAP Gateway runtime error. See the Gateway error log (/IWFND/ERROR_LOG).",
    ),
    (
        "/IWBEP/CX_MGW_BUSI_EXCEPTION",
        "The backend rejected the request because of a business rule.",
    ),
    (
        "/IWBEP/CX_MGW_TECH_EXCEPTION",
        "The backend failed with a technical error while processing the request.",
    ),
    (
        "CX_SY_",
        "An ABAP runtime exception occurred in the backend. Check transaction ST22 for dumps.",
    ),
    (
        "BAPI",
        "A BAPI reported an error. See the message text for the failing check.",
    ),
];

const BUSINESS_FALLBACK: &str =
    "Business error reported by the SAP system. Check the message text and the submitted data.";
const TECHNICAL_FALLBACK: &str =
    "Technical error in SAP Gateway or the backend. Check the Gateway error log.";
const GENERIC_FALLBACK: &str = "An error occurred in the SAP system.";

/// Explanation for a message code.
///
/// Exact table match, then prefix match, then a classification-based
/// explanation, then a generic one.
pub fn get_error_description(code: &str) -> &'static str {
    let code = code.trim();

    if let Some(&(_, description)) = ERROR_DESCRIPTIONS.iter().find(|(known, _)| *known == code) {
        return description;
    }

    if !code.is_empty()
        && let Some(&(_, description)) = ERROR_DESCRIPTIONS
            .iter()
            .find(|(known, _)| code.starts_with(known))
    {
        return description;
    }

    if is_business_error(code) {
        BUSINESS_FALLBACK
    } else if is_technical_error(code) {
        TECHNICAL_FALLBACK
    } else {
        GENERIC_FALLBACK
    }
}
