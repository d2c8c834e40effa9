//! Hand-built request bodies
//!
//! Only URIs and device ids are ever embedded, so escaping covers backslash
//! and double quote. Control characters and non-ASCII pass through as-is.

/// Escape `\` and `"` for embedding in a JSON string literal.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// `{"uris":["<uri>"]}`
pub fn play_body(uri: &str) -> String {
    format!(r#"{{"uris":["{}"]}}"#, escape(uri))
}

/// `{"device_ids":["<id>"],"play":<bool>}`
pub fn transfer_body(device_id: &str, play: bool) -> String {
    format!(r#"{{"device_ids":["{}"],"play":{play}}}"#, escape(device_id))
}
