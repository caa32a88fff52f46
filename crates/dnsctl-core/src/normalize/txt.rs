// # TXT values
//
// TXT data is kept unquoted in memory as a list of chunks, each at most
// 255 octets. Quoting happens only when a provider needs the zone-file
// wire form.

use crate::error::{Error, Result};
use crate::normalize::fields::split_fields;

/// Maximum length of a single TXT character-string, in octets
pub const TXT_CHUNK_MAX: usize = 255;

/// Split a TXT value into wire-sized chunks.
///
/// Chunks never split a UTF-8 sequence. An empty value is one empty chunk.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = rest.len().min(TXT_CHUNK_MAX);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head.to_string());
        rest = tail;
    }
    chunks
}

/// Re-chunk a list of strings so that every chunk fits the wire limit.
pub fn normalize_chunks<S: AsRef<str>>(parts: &[S]) -> Vec<String> {
    let joined: String = parts.iter().map(AsRef::as_ref).collect();
    split_chunks(&joined)
}

/// Quote one character-string, escaping `"` and `\`.
///
/// Control characters become `\DDD` so the result stays on one line.
pub fn quote(chunk: &str) -> String {
    let mut out = String::with_capacity(chunk.len() + 2);
    out.push('"');
    for c in chunk.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u8)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Encode chunks in wire form: `"…""…"`.
pub fn encode_wire<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks.iter().map(|c| quote(c.as_ref())).collect()
}

/// Decode a wire-form TXT value (`"a" "b"` or `"a""b"`) into its chunks.
///
/// An unquoted value is taken verbatim as a single chunk.
pub fn decode_wire(wire: &str) -> Result<Vec<String>> {
    let trimmed = wire.trim();
    if !trimmed.starts_with('"') {
        return Ok(vec![trimmed.to_string()]);
    }
    // Adjacent strings with no space between them are still separate chunks.
    let spaced = separate_adjacent_strings(trimmed);
    split_fields(&spaced)?
        .iter()
        .map(|field| {
            if field.starts_with('"') {
                crate::normalize::fields::unquote(field)
            } else {
                Err(Error::validation(format!(
                    "TXT value mixes quoted and unquoted text: {wire}"
                )))
            }
        })
        .collect()
}

fn separate_adjacent_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut in_quotes = false;
    let mut escaped = false;
    let mut prev_closed = false;
    for c in s.chars() {
        if prev_closed && c == '"' {
            out.push(' ');
        }
        prev_closed = false;
        if escaped {
            escaped = false;
        } else if c == '\\' && in_quotes {
            escaped = true;
        } else if c == '"' {
            if in_quotes {
                prev_closed = true;
            }
            in_quotes = !in_quotes;
        }
        out.push(c);
    }
    out
}
