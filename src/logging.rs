//! Logging setup and upstream-failure classification.
//!
//! Emission goes through `tracing`; this module owns subscriber
//! initialization plus the classification that decides how loudly a
//! failed fetch attempt is reported. Not every failure is equal: the
//! upstream intermittently garbles payloads (routine), while a refused
//! connection means the service itself is degraded.

use std::fmt;

use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use crate::error::{DecodeError, UpstreamError};

/// Installs the global `tracing` subscriber.
///
/// Honors `RUST_LOG`; defaults to `info` when unset. Call once at
/// process start — a second call panics, so embedding hosts that bring
/// their own subscriber should simply skip this.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Routine upstream behavior — garbled or partially encoded payloads
    /// that usually clear up on the next attempt.
    Expected,
    /// Indicates service degradation or a configuration issue.
    Unexpected,
    /// Cannot determine — the station may be offline or decommissioned.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classifies one failed fetch attempt.
pub fn classify_upstream_failure(err: &UpstreamError) -> FailureType {
    match err {
        // Timeouts, refused connections, and HTTP errors all point at the
        // service or the path to it, not at the station.
        UpstreamError::Transport(_) => FailureType::Unexpected,
        // An empty or valueless timeseries often means the station is
        // offline or not yet backfilled.
        UpstreamError::Decode(DecodeError::MissingValueField) => FailureType::Unknown,
        // Garbled bodies are a known upstream quirk.
        UpstreamError::Decode(_) => FailureType::Expected,
    }
}

/// Logs one failed fetch attempt, with the classification selecting the
/// level: expected failures at debug, unknown at warn, unexpected at
/// error.
pub fn log_fetch_failure(station_code: &str, attempt: u32, max_attempts: u32, err: &UpstreamError) {
    let failure_type = classify_upstream_failure(err);
    match failure_type {
        FailureType::Expected => debug!(
            station = %station_code,
            attempt,
            max_attempts,
            %failure_type,
            %err,
            "fetch attempt failed"
        ),
        FailureType::Unexpected => error!(
            station = %station_code,
            attempt,
            max_attempts,
            %failure_type,
            %err,
            "fetch attempt failed"
        ),
        FailureType::Unknown => warn!(
            station = %station_code,
            attempt,
            max_attempts,
            %failure_type,
            %err,
            "fetch attempt failed"
        ),
    }
}
