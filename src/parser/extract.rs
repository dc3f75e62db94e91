//! Pull a JSON value out of free-form model output.
//!
//! Models wrap JSON in prose and markdown fences. Instead of a greedy regex,
//! scan for balanced brackets while tracking string literals, and return the
//! first candidate that actually parses.

use serde_json::Value;

/// First well-formed JSON array or object embedded in `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = bytes[start..].iter().position(|b| *b == b'[' || *b == b'{') {
        let open = start + offset;
        if let Some(close) = matching_close(bytes, open) {
            let candidate = &text[open..=close];
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate);
            }
        }
        start = open + 1;
    }
    None
}

/// Parse the first embedded JSON value.
pub fn extract_value(text: &str) -> Option<Value> {
    extract_json(text).and_then(|s| serde_json::from_str(s).ok())
}

/// Index of the bracket closing the one at `open`, honouring nesting and
/// string literals. `None` if unbalanced or mismatched.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b']' | b'}' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
