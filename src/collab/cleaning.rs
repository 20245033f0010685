//! Response cleaning helpers for LLM replies.
//!
//! Models wrap code and JSON in markdown fences and pad structured replies
//! with prose. These helpers strip the wrapping so the adapters can parse
//! the payload; callers treat a reply that still fails to parse as an
//! empty/default result, never as a fatal error.

/// Strip markdown code fences from a reply, keeping only the fenced body
/// when fences are present.
///
/// Handles a leading language tag (```json, ```python) and a trailing
/// fence. Replies without fences are returned trimmed.
#[must_use]
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut lines = trimmed.lines();
    // Drop the opening fence (with optional language tag).
    lines.next();
    let body: Vec<&str> = lines.take_while(|line| !line.trim_start().starts_with("```")).collect();
    body.join("\n").trim().to_string()
}

/// Extract the first balanced JSON object or array from a reply.
///
/// Scans for the first `{` or `[` and returns the substring up to its
/// matching close bracket, respecting string literals and escapes. Returns
/// `None` when no balanced payload exists.
#[must_use]
pub fn extract_json(text: &str) -> Option<String> {
    let cleaned = strip_code_fences(text);
    let start = cleaned.find(['{', '['])?;
    let open = cleaned.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in cleaned.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(cleaned[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a reply as JSON after cleaning, falling back to `None` on any
/// parse failure.
#[must_use]
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let payload = extract_json(text)?;
    serde_json::from_str(&payload).ok()
}
