//! Message frame decoding.
//!
//! Queue records carry a text frame:
//!
//! ```text
//! FTMSG/1.0
//! Message-Id: bb07b9ab-0ff6-4853-bdd1-104906d7d282
//! Origin-System-Id: http://cmdb.ft.com/systems/methode-web-pub
//! X-Request-Id: tid_6y3oogjqhk
//!
//! { "uuid": "..." }
//! ```
//!
//! A version line, `Key: value` header lines, a blank line, then the body.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::types::{Message, QueueError};

const FRAME_VERSION_PREFIX: &str = "FTMSG/";

/// Decode a base64 record value into a [`Message`].
pub fn decode_record(value: &str) -> Result<Message, QueueError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| QueueError::Frame(format!("invalid base64: {e}")))?;
    let text =
        String::from_utf8(bytes).map_err(|e| QueueError::Frame(format!("invalid utf-8: {e}")))?;

    parse_frame(&text)
}

/// Parse a text frame into headers and body.
///
/// Accepts both `\r\n` and `\n` line endings. The body is kept verbatim apart
/// from surrounding whitespace.
pub fn parse_frame(raw: &str) -> Result<Message, QueueError> {
    let raw = raw.trim_start();
    let (head, body) = split_head(raw)
        .ok_or_else(|| QueueError::Frame("missing blank line before body".to_string()))?;

    let mut lines = head.lines();
    let version = lines.next().unwrap_or_default().trim();
    if !version.starts_with(FRAME_VERSION_PREFIX) {
        return Err(QueueError::Frame(format!("unknown frame version: {version}")));
    }

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => return Err(QueueError::Frame(format!("invalid header line: {line}"))),
        }
    }

    Ok(Message::new(headers, body.trim()))
}

/// Split at the first blank line, whichever line ending it uses.
fn split_head(raw: &str) -> Option<(&str, &str)> {
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let lf = raw.find("\n\n").map(|i| (i, 2));

    let (index, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    Some((&raw[..index], &raw[index + len..]))
}
