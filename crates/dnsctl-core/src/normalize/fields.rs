// # RFC-1035 field tokenizer
//
// Splits one zone-file style line into fields. Fields are separated by
// whitespace; a double-quoted run is one field and is returned verbatim,
// quotes and escapes included. `;` outside quotes starts a comment.

use crate::error::{Error, Result};

/// Split one logical record line into fields.
pub fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
                current.push(c);
                in_quotes = true;
            }
            ';' => break,
            '\n' | '\r' => {
                return Err(Error::validation(format!(
                    "more than one record on a line: {line:?}"
                )));
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::validation(format!("unterminated quoted string: {line:?}")));
    }
    if !current.is_empty() {
        fields.push(current);
    }
    Ok(fields)
}

/// Strip surrounding quotes and resolve `\"`, `\\` and `\DDD` escapes.
///
/// `\DDD` escapes are octets; the decoded bytes must form valid UTF-8.
/// Unquoted input is returned unchanged.
pub fn unquote(field: &str) -> Result<String> {
    let Some(inner) = field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
    else {
        return Ok(field.to_string());
    };

    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut buf = [0u8; 4];
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            None => {
                return Err(Error::validation(format!("dangling escape in {field}")));
            }
            Some(d) if d.is_ascii_digit() => {
                let digits: String = std::iter::once(d).chain(chars.by_ref().take(2)).collect();
                let octet = if digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit()) {
                    digits.parse::<u8>().ok()
                } else {
                    None
                };
                match octet {
                    Some(byte) => out.push(byte),
                    None => {
                        return Err(Error::validation(format!(
                            "malformed escape \\{digits} in {field}"
                        )));
                    }
                }
            }
            Some(other) => out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes()),
        }
    }
    String::from_utf8(out)
        .map_err(|_| Error::validation(format!("escapes in {field} are not valid UTF-8")))
}
