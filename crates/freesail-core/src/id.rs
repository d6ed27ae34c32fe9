//! ID and timestamp helpers.

use uuid::Uuid;

/// Generate a new UUID v4.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a server-assigned session id.
pub fn session_id() -> String {
    format!("sess_{}", Uuid::new_v4().simple())
}

/// Current wall-clock time as an RFC 3339 string (used for action timestamps).
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Check if a surface or component id is usable on the wire.
///
/// Ids must be non-empty and free of whitespace and control characters; `/`
/// is rejected so ids can be embedded in JSON pointers without escaping.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '/')
}
