//! Narrow field extraction for token endpoint payloads
//!
//! The token endpoint answers with a small flat object. Rather than pull in a
//! full parser for three fields, `extract` locates `"key"`, skips to the value
//! after the next colon and reads one scalar:
//!
//! - quoted strings, resolving `\" \\ \/ \b \f \n \r \t` (any other escaped
//!   character is kept literally, so `\u0041` yields `u0041`)
//! - bare tokens (numbers, `true`, `false`, `null`) up to the next `,` `}` or `]`,
//!   trimmed and with stray quotes removed
//!
//! Arrays, nested objects and unicode escapes are out of scope.

/// Find the scalar value of the first `"key"` in `payload`.
///
/// Returns `None` when the quoted key is absent, no colon follows it, nothing
/// follows the colon, or a string value is unterminated.
pub fn extract(payload: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let after_key = payload.find(&needle)? + needle.len();
    let colon = after_key + payload[after_key..].find(':')?;
    let value = payload[colon + 1..].trim_start();

    let mut chars = value.chars();
    match chars.next()? {
        '"' => read_string(chars),
        _ => {
            let end = value.find([',', '}', ']']).unwrap_or(value.len());
            Some(value[..end].trim().replace('"', ""))
        }
    }
}

/// Extract `key` and keep only its ASCII digits.
///
/// Lossy on purpose: signs and decimal points are dropped, and a non-numeric
/// value yields an empty string. Only used for `expires_in`, which is always a
/// positive whole number of seconds.
pub fn extract_number(payload: &str, key: &str) -> Option<String> {
    extract(payload, key).map(|value| value.chars().filter(char::is_ascii_digit).collect())
}

/// Read a string literal body; the opening quote is already consumed.
fn read_string(mut chars: std::str::Chars<'_>) -> Option<String> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                // `"`, `\`, `/` and the permissive fallback
                other => out.push(other),
            },
            '"' => return Some(out),
            c => out.push(c),
        }
    }
    None
}
