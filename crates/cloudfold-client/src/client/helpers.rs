//! Pure helpers: header and error-body parsing (no HTTP, no status logic).

/// Extract the file name from a `Content-Disposition` header.
///
/// Handles `attachment; filename="a b.txt"` and the unquoted form.
pub(crate) fn parse_content_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        let (key, raw) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Human-readable message from an error response body.
///
/// Expected format: `{"message": "..."}` (or `"error"`); falls back to the
/// first 200 characters of the raw body, then to the status reason.
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .filter(|m| !m.is_empty());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('{') {
        fallback.to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
