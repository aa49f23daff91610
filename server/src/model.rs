use crate::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;

pub use circle_api::{Application, Chat, ChatSummary, Circle, CircleType, Message, User};

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Generate a fresh identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Reject identifiers that could not have been issued by this service.
pub fn check_id(field: &'static str, value: &str) -> AppResult<()> {
    if ID_RE.is_match(value) {
        Ok(())
    } else {
        Err(AppError::validation(field, format!("invalid {field}")))
    }
}

/// Trim an optional input and require it to be non-empty.
pub fn required(field: &'static str, value: Option<&str>) -> AppResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(field, format!("{field} is required"))),
    }
}
