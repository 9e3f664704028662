//! Helpers for keeping logs, spans and stored error messages small and free
//! of local paths.

use std::path::Path;

/// Maximum number of characters of a remote error body kept in messages.
pub const MAX_ERROR_BODY_CHARS: usize = 200;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Truncates a response body to [`MAX_ERROR_BODY_CHARS`] characters,
/// respecting UTF-8 boundaries.
pub fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}... (truncated)", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
