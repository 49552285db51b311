//! Lenient JSON recovery for provider output.
//!
//! Providers are asked to emit a single JSON object, but CLI agents often
//! wrap it in prose or code fences. `extract_first_json_object` scans for
//! the first balanced `{…}` span, honoring string literals and escapes.

use serde_json::Value;

pub fn try_parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Find and parse the first balanced JSON object embedded in `text`.
///
/// Returns `None` when no balanced object exists or the candidate span is
/// not valid JSON.
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match b {
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return try_parse_json(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
