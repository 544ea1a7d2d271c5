//! Retry controller and per-cycle poll bookkeeping.
//!
//! One poll cycle = up to [`MAX_ATTEMPTS`] fetch+decode attempts with a
//! short delay between them, short-circuiting on the first success. Both
//! transport and decode failures are retryable — the upstream is known to
//! intermittently return garbled payloads that clear up on the next
//! attempt. Per-attempt errors never escape this module: [`poll_once`]
//! always returns a next [`AcquisitionState`].

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::calibrate::normalize;
use crate::decode::decode;
use crate::error::{ExhaustedError, TransportError, UpstreamError};
use crate::ingest::remap::Fetch;
use crate::logging::log_fetch_failure;
use crate::model::{AcquisitionState, NormalizedReading, PAYLOAD_DIAGNOSTIC_LIMIT, RawReading};
use crate::stations::StationConfig;

/// Attempts per poll cycle: one initial try plus two retries.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay between attempts. There is no delay after the final failure.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Anti-cache token source
// ---------------------------------------------------------------------------

/// Source of per-request anti-cache tokens.
///
/// Injected rather than drawn from ambient randomness so tests can supply
/// a deterministic sequence.
pub trait TokenSource {
    fn next_token(&mut self) -> u64;
}

/// Default entropy-seeded token source.
#[derive(Debug)]
pub struct RandomTokens {
    rng: StdRng,
}

impl RandomTokens {
    pub fn new() -> Self {
        RandomTokens {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for RandomTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for RandomTokens {
    fn next_token(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

// ---------------------------------------------------------------------------
// Retry controller
// ---------------------------------------------------------------------------

/// Retry policy for one poll cycle. The delay is injectable so tests run
/// without waiting; production uses [`Default`].
#[derive(Debug, Clone, Copy)]
pub struct Acquirer {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for Acquirer {
    fn default() -> Self {
        Acquirer {
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// Everything one successful attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReading {
    pub normalized: NormalizedReading,
    pub raw: RawReading,
}

/// Result of one cycle plus the diagnostics gathered along the way,
/// regardless of outcome.
#[derive(Debug)]
pub struct AcquireOutcome {
    pub result: Result<CycleReading, ExhaustedError>,
    /// Status of the most recent attempt that got an HTTP response.
    pub last_http_status: Option<u16>,
    /// Truncated body of the most recent attempt that failed to decode.
    pub payload_diagnostic: Option<String>,
}

impl Acquirer {
    /// Runs one poll cycle: fetch, decode, normalize, short-circuiting on
    /// the first success.
    ///
    /// Each attempt gets a fresh anti-cache token. Inter-attempt delays
    /// suspend cooperatively; nothing here blocks the runtime.
    pub async fn acquire<F, T>(
        &self,
        fetcher: &F,
        tokens: &mut T,
        config: &StationConfig,
    ) -> AcquireOutcome
    where
        F: Fetch,
        T: TokenSource,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_http_status = None;
        let mut payload_diagnostic = None;
        let mut last_err: Option<UpstreamError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.retry_delay).await;
            }

            let token = tokens.next_token();
            match fetcher.fetch(&config.station_code, token, config.stamp).await {
                Ok(fetched) => {
                    last_http_status = Some(fetched.status);
                    match decode(&fetched.body) {
                        Ok(raw) => {
                            let normalized = normalize(raw.value, config.stamp);
                            debug!(
                                station = %config.station_code,
                                attempt,
                                value = normalized.value,
                                "reading acquired"
                            );
                            return AcquireOutcome {
                                result: Ok(CycleReading { normalized, raw }),
                                last_http_status,
                                payload_diagnostic,
                            };
                        }
                        Err(err) => {
                            payload_diagnostic = Some(payload_snippet(&fetched.body));
                            let err = UpstreamError::from(err);
                            log_fetch_failure(&config.station_code, attempt, attempts, &err);
                            last_err = Some(err);
                        }
                    }
                }
                Err(err) => {
                    if let TransportError::HttpError(status) = &err {
                        last_http_status = Some(*status);
                    }
                    let err = UpstreamError::from(err);
                    log_fetch_failure(&config.station_code, attempt, attempts, &err);
                    last_err = Some(err);
                }
            }
        }

        let last = last_err.unwrap_or_else(|| {
            TransportError::ConnectionFailure("no attempt was made".to_string()).into()
        });
        AcquireOutcome {
            result: Err(ExhaustedError { attempts, last }),
            last_http_status,
            payload_diagnostic,
        }
    }
}

/// One scheduled poll cycle. Never fails: transient upstream trouble
/// degrades to a stale-but-present state rather than an error.
pub async fn poll_once<F, T>(
    acquirer: &Acquirer,
    fetcher: &F,
    tokens: &mut T,
    config: &StationConfig,
    prior: &AcquisitionState,
) -> AcquisitionState
where
    F: Fetch,
    T: TokenSource,
{
    let outcome = acquirer.acquire(fetcher, tokens, config).await;
    match outcome.result {
        Ok(cycle) => prior.with_success(
            cycle.normalized,
            &cycle.raw,
            outcome.last_http_status,
            Utc::now(),
        ),
        Err(err) => {
            warn!(
                station = %config.station_code,
                failures = prior.consecutive_failures + 1,
                %err,
                "poll cycle exhausted"
            );
            prior.with_exhaustion(err, outcome.last_http_status, outcome.payload_diagnostic)
        }
    }
}

fn payload_snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(PAYLOAD_DIAGNOSTIC_LIMIT)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
