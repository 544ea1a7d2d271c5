//! Error taxonomy for the radiation acquisition pipeline.
//!
//! Per-attempt errors (`TransportError`, `DecodeError`) are absorbed by the
//! retry controller and never surface past `poll_once`; only `ConfigError`
//! propagates synchronously to the caller, since it represents a setup-time
//! contract violation the host must reject immediately.

use std::time::Duration;
use thiserror::Error;

use crate::calibrate::{STAMP_MAX, STAMP_MIN};
use crate::stations::MIN_POLL_INTERVAL_SECS;

/// A single outbound request failed before yielding a response body.
///
/// None of these are retried internally — the retry controller owns the
/// retry policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("HTTP error: {0}")]
    HttpError(u16),
}

/// The response body could not be turned into a usable reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Every text decoding strategy failed. Latin-1 accepts arbitrary byte
    /// sequences, so this is modeled for completeness rather than expected
    /// in practice.
    #[error("no text encoding produced a usable payload")]
    EncodingExhausted,
    /// The payload parsed but carried no usable numeric value, or was an
    /// empty timeseries.
    #[error("payload contains no usable value field")]
    MissingValueField,
    /// Neither structured parsing nor degraded extraction succeeded.
    #[error("malformed payload: {0}")]
    MalformedStructure(String),
}

/// Union of the failures a single fetch attempt can produce.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// All attempts in one poll cycle failed. Carries the last observed error
/// for diagnostics; never raised past the poll cycle boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("all {attempts} fetch attempts failed, last error: {last}")]
pub struct ExhaustedError {
    pub attempts: u32,
    pub last: UpstreamError,
}

/// Setup-time contract violations, raised at `configure`, not at poll time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("station code must not be empty")]
    EmptyStationCode,
    #[error("calibration stamp {0} outside [{STAMP_MIN}, {STAMP_MAX}]")]
    StampOutOfRange(u16),
    #[error("poll interval {0}s below minimum {MIN_POLL_INTERVAL_SECS}s")]
    IntervalTooShort(u64),
    #[error("failed to read station file {path}: {detail}")]
    UnreadableStationFile { path: String, detail: String },
    #[error("failed to parse station file {path}: {detail}")]
    MalformedStationFile { path: String, detail: String },
}
