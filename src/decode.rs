//! Response decoding: raw REMap bytes → [`RawReading`].
//!
//! The upstream does not commit to a response encoding and intermittently
//! returns partially garbled payloads, so decoding is an ordered chain of
//! strategies evaluated until one succeeds:
//!
//! 1. text: UTF-8, then Latin-1 (total over arbitrary bytes, so the text
//!    stage always terminates deterministically);
//! 2. payload: structured JSON (an array of timeseries entries, newest
//!    last), then a degraded substring scan for the expected fields.
//!
//! Missing diagnostic fields (`date`, `code`, `status`) are left unset,
//! never treated as fatal.

use serde::Deserialize;
use tracing::trace;

use crate::error::DecodeError;
use crate::model::{KEY_CODE, KEY_DATE, KEY_STATUS, KEY_VALUE, RawReading};

// ---------------------------------------------------------------------------
// Text decoding
// ---------------------------------------------------------------------------

type TextStrategy = fn(&[u8]) -> Option<String>;

/// Text decodings tried in order. Latin-1 maps every byte, so the list has
/// a guaranteed terminal path.
const TEXT_STRATEGIES: &[(&str, TextStrategy)] = &[("utf-8", text_utf8), ("latin-1", text_latin1)];

fn text_utf8(raw: &[u8]) -> Option<String> {
    std::str::from_utf8(raw).ok().map(str::to_owned)
}

fn text_latin1(raw: &[u8]) -> Option<String> {
    // ISO-8859-1 code points coincide with the first 256 Unicode scalars.
    Some(raw.iter().map(|&b| char::from(b)).collect())
}

fn decode_text(raw: &[u8]) -> Result<String, DecodeError> {
    for (name, strategy) in TEXT_STRATEGIES {
        if let Some(text) = strategy(raw) {
            trace!(encoding = name, "text decoded");
            return Ok(text);
        }
    }
    Err(DecodeError::EncodingExhausted)
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// One entry of the REMap timeseries array. Every field is optional; the
/// API omits or garbles them freely.
#[derive(Debug, Deserialize)]
struct TimeseriesEntry {
    code: Option<String>,
    date: Option<String>,
    value: Option<f64>,
    status: Option<String>,
}

type ParseStrategy = fn(&str) -> Result<RawReading, DecodeError>;

const PARSE_STRATEGIES: &[(&str, ParseStrategy)] =
    &[("structured", parse_structured), ("degraded", parse_degraded)];

/// Structured parse: deserialize the full timeseries and take the last
/// (most recent) entry.
fn parse_structured(text: &str) -> Result<RawReading, DecodeError> {
    let entries: Vec<TimeseriesEntry> = serde_json::from_str(text)
        .map_err(|err| DecodeError::MalformedStructure(err.to_string()))?;

    let last = entries
        .into_iter()
        .next_back()
        .ok_or(DecodeError::MissingValueField)?;
    let value = last.value.ok_or(DecodeError::MissingValueField)?;

    Ok(RawReading {
        value,
        date: last.date,
        returned_code: last.code,
        status: last.status,
    })
}

/// Degraded parse: substring scan for the expected keys. Recovers the
/// newest `"value"` from payloads whose JSON framing is broken.
fn parse_degraded(text: &str) -> Result<RawReading, DecodeError> {
    let value = scan_last_number(text, KEY_VALUE).ok_or(DecodeError::MissingValueField)?;

    Ok(RawReading {
        value,
        date: scan_last_string(text, KEY_DATE),
        returned_code: scan_last_string(text, KEY_CODE),
        status: scan_last_string(text, KEY_STATUS),
    })
}

/// Decodes one raw response body into a reading.
///
/// Returns the most specific error observed across strategies: a payload
/// that parsed but held no numeric value reports `MissingValueField`
/// rather than `MalformedStructure`.
pub fn decode(raw: &[u8]) -> Result<RawReading, DecodeError> {
    let text = decode_text(raw)?;

    let mut last_err: Option<DecodeError> = None;
    for (name, parse) in PARSE_STRATEGIES {
        match parse(&text) {
            Ok(reading) => {
                trace!(strategy = name, "payload parsed");
                return Ok(reading);
            }
            Err(err) => {
                trace!(strategy = name, %err, "parse strategy failed");
                last_err = Some(match (last_err.take(), err) {
                    // A parsed-but-valueless structure is more informative
                    // than a later strategy failing to find anything.
                    (Some(prev @ DecodeError::MissingValueField), _) => prev,
                    // The degraded scanner coming up empty on unparseable
                    // text does not upgrade a syntax error to "missing".
                    (Some(prev @ DecodeError::MalformedStructure(_)), DecodeError::MissingValueField) => {
                        prev
                    }
                    (_, err) => err,
                });
            }
        }
    }

    Err(last_err.unwrap_or(DecodeError::MissingValueField))
}

// ---------------------------------------------------------------------------
// Degraded-extraction scanners
// ---------------------------------------------------------------------------

/// Finds the last `"key"` occurrence followed by a parseable number.
fn scan_last_number(text: &str, key: &str) -> Option<f64> {
    let mut result = None;
    for rest in occurrences_after_key(text, key) {
        if let Some(value) = number_after_colon(rest) {
            result = Some(value);
        }
    }
    result
}

/// Finds the last `"key"` occurrence followed by a quoted string.
fn scan_last_string(text: &str, key: &str) -> Option<String> {
    let mut result = None;
    for rest in occurrences_after_key(text, key) {
        if let Some(value) = string_after_colon(rest) {
            result = Some(value);
        }
    }
    result
}

/// Yields the text following each `"key"` occurrence, in order.
fn occurrences_after_key<'a>(text: &'a str, key: &str) -> Vec<&'a str> {
    let needle = format!("\"{key}\"");
    let mut tails = Vec::new();
    let mut start = 0;
    while let Some(found) = text[start..].find(&needle) {
        let after = start + found + needle.len();
        tails.push(&text[after..]);
        start = after;
    }
    tails
}

fn number_after_colon(rest: &str) -> Option<f64> {
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    // Tolerate numbers the upstream wrapped in quotes.
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn string_after_colon(rest: &str) -> Option<String> {
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
