//! Message metadata extraction.
//!
//! Transaction ids and origin-system ids are read from message headers with
//! right-anchored patterns: only the trailing match of a header value is kept,
//! so a URL-like `Origin-System-Id` yields just its last path segment.
//!
//! All functions here are pure and return a tagged [`Extraction`].

use std::collections::HashMap;
use std::sync::OnceLock;

use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use thiserror::Error;

/// Header carrying the transaction id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Header carrying the producing system's id.
pub const ORIGIN_SYSTEM_HEADER: &str = "Origin-System-Id";

const TID_PATTERN: &str = r"(tid|SYNTHETIC-REQ-MON)[a-zA-Z0-9_-]*$";
const SYSTEM_ID_PATTERN: &str = r"[a-zA-Z-]*$";

const SYNTHETIC_TID_PREFIX: &str = "tid_";
const SYNTHETIC_TID_SUFFIX: &str = "_kafka_bridge";
const SYNTHETIC_TID_RANDOM_LEN: usize = 10;

fn tid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TID_PATTERN).expect("transaction id pattern is valid"))
}

fn system_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SYSTEM_ID_PATTERN).expect("system id pattern is valid"))
}

/// Result of reading one piece of metadata out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The value was present and well formed.
    Found(String),
    /// The header (or JSON field) was absent or empty.
    NotFound,
    /// A value was present but did not match the expected format. Carries the raw value.
    Malformed(String),
}

impl Extraction {
    /// The extracted value, if any.
    pub fn found(self) -> Option<String> {
        match self {
            Extraction::Found(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into a `Result`, naming `field` in the error.
    pub fn into_result(self, field: &'static str) -> Result<String, ExtractError> {
        match self {
            Extraction::Found(value) => Ok(value),
            Extraction::NotFound => Err(ExtractError::NotFound(field)),
            Extraction::Malformed(raw) => Err(ExtractError::Malformed { field, raw }),
        }
    }
}

/// Extraction failure with enough context for a log line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("{0} could not be found")]
    NotFound(&'static str),

    #[error("{field} is in unknown format: {raw}")]
    Malformed { field: &'static str, raw: String },
}

/// Extract the transaction id from the `X-Request-Id` header.
///
/// The pattern is applied to the whole (trimmed) header value and the match
/// must end at the end of the value, e.g. `"tid_ABCDe12345"` or
/// `"SYNTHETIC-REQ-MON_ABCDe12345"`. A value with no recognised prefix is
/// reported as [`Extraction::Malformed`].
pub fn extract_tid(headers: &HashMap<String, String>) -> Extraction {
    let raw = match headers.get(REQUEST_ID_HEADER) {
        Some(value) if !value.trim().is_empty() => value.trim(),
        _ => return Extraction::NotFound,
    };

    match tid_regex().find(raw) {
        Some(m) => Extraction::Found(m.as_str().to_string()),
        None => Extraction::Malformed(raw.to_string()),
    }
}

/// Extract the origin system id from the `Origin-System-Id` header.
///
/// Only the trailing `[a-zA-Z-]*` run is kept:
/// `"http://cmdb.ft.com/systems/methode-web-pub"` gives `"methode-web-pub"`.
/// Missing, blank, or values that end in anything else yield `NotFound`.
pub fn extract_origin_system(headers: &HashMap<String, String>) -> Extraction {
    let raw = match headers.get(ORIGIN_SYSTEM_HEADER) {
        Some(value) => value.trim(),
        None => return Extraction::NotFound,
    };

    match system_id_regex().find(raw) {
        Some(m) if !m.as_str().is_empty() => Extraction::Found(m.as_str().to_string()),
        _ => Extraction::NotFound,
    }
}

/// Extract the payload uuid from a JSON body's top-level `uuid` string.
pub fn extract_uuid(body: &str) -> Extraction {
    let json: serde_json::Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) => return Extraction::NotFound,
    };

    match json.get("uuid").and_then(|v| v.as_str()) {
        Some(uuid) if !uuid.is_empty() => Extraction::Found(uuid.to_string()),
        _ => Extraction::NotFound,
    }
}

/// Generate a transaction id for messages that arrive without a usable one.
pub fn synthesize_tid() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SYNTHETIC_TID_RANDOM_LEN)
        .map(char::from)
        .collect();

    format!("{SYNTHETIC_TID_PREFIX}{random}{SYNTHETIC_TID_SUFFIX}")
}
