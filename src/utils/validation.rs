// Validation utilities for identity fields

use once_cell::sync::Lazy;
use regex::Regex;

/// E.164: leading '+', 1-9 first digit, at most 15 digits total
static E164_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("valid E.164 regex"));

/// Pragmatic email syntax check; full RFC validation is done by the
/// `validator` derive on request DTOs, this guards repository-level writes.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn is_valid_e164(phone: &str) -> bool {
    E164_RE.is_match(phone)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 320 && EMAIL_RE.is_match(email)
}

/// Trim and validate string fields
pub fn trim_and_validate_field(field: &str, required: bool) -> Result<String, String> {
    let trimmed = field.trim().to_string();
    if trimmed.is_empty() {
        if required {
            Err("Field cannot be empty".to_string())
        } else {
            Ok(trimmed)
        }
    } else {
        Ok(trimmed)
    }
}

/// Trim an optional string field; empty collapses to None
pub fn trim_optional_field(field: Option<&String>) -> Option<String> {
    field.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
