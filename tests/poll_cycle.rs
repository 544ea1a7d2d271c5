//! End-to-end poll cycle tests through the public session API.
//!
//! Network access is replaced by scripted `Fetch` implementations so
//! retry, staleness, overlap, and cancellation behavior run
//! deterministically (and with zero retry delay).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::{Barrier, watch};

use radmon_service::acquire::{Acquirer, MAX_ATTEMPTS, TokenSource};
use radmon_service::error::{TransportError, UpstreamError};
use radmon_service::ingest::remap::{Fetch, RawFetch};
use radmon_service::model::AcquisitionState;
use radmon_service::session::{PollOutcome, PollSession};
use radmon_service::stations::StationConfig;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Replays a scripted sequence of fetch outcomes; times out once the
/// script runs dry.
struct ScriptedFetcher {
    outcomes: Mutex<VecDeque<Result<RawFetch, TransportError>>>,
}

impl ScriptedFetcher {
    fn new(outcomes: Vec<Result<RawFetch, TransportError>>) -> Self {
        ScriptedFetcher {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

impl Fetch for ScriptedFetcher {
    async fn fetch(
        &self,
        _station_code: &str,
        _anti_cache_token: u64,
        _stamp: u16,
    ) -> Result<RawFetch, TransportError> {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout(Duration::from_secs(30))))
    }
}

/// Parks inside `fetch` until the test joins the barriers, so a cycle
/// can be held in flight at a known point.
struct GatedFetcher {
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl Fetch for GatedFetcher {
    async fn fetch(
        &self,
        _station_code: &str,
        _anti_cache_token: u64,
        _stamp: u16,
    ) -> Result<RawFetch, TransportError> {
        self.entered.wait().await;
        self.release.wait().await;
        Ok(ok_body())
    }
}

struct SequentialTokens(u64);

impl TokenSource for SequentialTokens {
    fn next_token(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

fn config() -> StationConfig {
    StationConfig::with_stamp("EE20395", "Tartu", 3600, 500).unwrap()
}

fn fast_acquirer() -> Acquirer {
    Acquirer {
        max_attempts: MAX_ATTEMPTS,
        retry_delay: Duration::ZERO,
    }
}

fn ok_body() -> RawFetch {
    RawFetch {
        status: 200,
        body: br#"[{"code": "EE20395", "date": "2026-08-01T11:00:00Z", "value": 250500.0, "status": "ok"}]"#
            .to_vec(),
    }
}

fn timeout() -> Result<RawFetch, TransportError> {
    Err(TransportError::Timeout(Duration::from_secs(30)))
}

fn session<F: Fetch>(
    fetcher: F,
    shutdown: watch::Receiver<bool>,
) -> PollSession<F, SequentialTokens> {
    PollSession::new(
        config(),
        fast_acquirer(),
        fetcher,
        SequentialTokens(0),
        shutdown,
    )
}

// ---------------------------------------------------------------------------
// Acquisition and staleness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_successful_cycle_normalizes_with_the_station_stamp() {
    let (_tx, rx) = watch::channel(false);
    let session = session(ScriptedFetcher::new(vec![Ok(ok_body())]), rx);

    let outcome = session.poll().await;
    let PollOutcome::Completed(state) = outcome else {
        panic!("expected a completed cycle, got {outcome:?}");
    };

    // stamp 500 → divisor 501; 250500 / 501 = 500.0 nSv/h.
    assert_eq!(state.current_value(), Some(500.0));
    assert!(!state.is_stale());
    assert_eq!(state.last_http_status, Some(200));
    assert_eq!(state.returned_code.as_deref(), Some("EE20395"));
    assert_eq!(state.upstream_status.as_deref(), Some("ok"));
    assert_eq!(session.snapshot(), state);
}

#[tokio::test]
async fn test_exhausted_cycle_keeps_the_stale_reading_visible() {
    // One good cycle, then every later attempt times out.
    let (_tx, rx) = watch::channel(false);
    let session = session(
        ScriptedFetcher::new(vec![Ok(ok_body()), timeout(), timeout(), timeout()]),
        rx,
    );

    let PollOutcome::Completed(good) = session.poll().await else {
        panic!("first cycle should complete");
    };
    assert_eq!(good.current_value(), Some(500.0));

    let PollOutcome::Completed(stale) = session.poll().await else {
        panic!("second cycle should complete (as exhausted)");
    };
    assert_eq!(stale.current_value(), Some(500.0));
    assert!(stale.is_stale());
    assert_eq!(stale.consecutive_failures, 1);
    assert_eq!(
        stale.last_error,
        Some(UpstreamError::from(TransportError::Timeout(
            Duration::from_secs(30)
        )))
    );
    assert_eq!(stale.last_update, good.last_update);
}

#[tokio::test]
async fn test_never_successful_station_reads_as_unavailable() {
    let (_tx, rx) = watch::channel(false);
    let session = session(ScriptedFetcher::new(Vec::new()), rx);

    for expected_failures in 1..=2 {
        let PollOutcome::Completed(state) = session.poll().await else {
            panic!("cycle should complete");
        };
        assert_eq!(state.current_value(), None);
        assert_eq!(state.consecutive_failures, expected_failures);
    }
}

#[tokio::test]
async fn test_recovery_resets_the_failure_counter() {
    let (_tx, rx) = watch::channel(false);
    let session = session(
        ScriptedFetcher::new(vec![
            timeout(),
            timeout(),
            timeout(),
            // Next cycle: two garbled attempts, then success.
            timeout(),
            timeout(),
            Ok(ok_body()),
        ]),
        rx,
    );

    let PollOutcome::Completed(failed) = session.poll().await else {
        panic!("cycle should complete");
    };
    assert_eq!(failed.consecutive_failures, 1);

    let PollOutcome::Completed(recovered) = session.poll().await else {
        panic!("cycle should complete");
    };
    assert_eq!(recovered.current_value(), Some(500.0));
    assert_eq!(recovered.consecutive_failures, 0);
    assert!(!recovered.is_stale());
    assert_eq!(recovered.last_error, None);
}

#[tokio::test]
async fn test_host_attributes_follow_the_last_good_reading() {
    let (_tx, rx) = watch::channel(false);
    let session = session(
        ScriptedFetcher::new(vec![Ok(ok_body()), timeout(), timeout(), timeout()]),
        rx,
    );

    let PollOutcome::Completed(good) = session.poll().await else {
        panic!("cycle should complete");
    };
    let attrs = good.host_attributes("EE20395");
    assert_eq!(attrs["station_code"], "EE20395");
    assert_eq!(attrs["raw_value"], 250_500.0);
    assert_eq!(attrs["stamp"], 500);
    assert_eq!(attrs["divisor"], 501.0);
    assert_eq!(attrs["timestamp"], "2026-08-01T11:00:00Z");
    assert_eq!(attrs["status"], "ok");

    // The stale cycle must not change what the host sees.
    let PollOutcome::Completed(stale) = session.poll().await else {
        panic!("cycle should complete");
    };
    assert_eq!(stale.host_attributes("EE20395"), attrs);
}

// ---------------------------------------------------------------------------
// Overlap guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tick_during_an_inflight_cycle_is_skipped() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (_tx, rx) = watch::channel(false);
    let session = Arc::new(session(
        GatedFetcher {
            entered: entered.clone(),
            release: release.clone(),
        },
        rx,
    ));

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.poll().await }
    });

    // The first cycle is now parked inside its fetch.
    entered.wait().await;
    assert_eq!(session.poll().await, PollOutcome::Skipped);
    assert_eq!(session.force_refresh().await, PollOutcome::Skipped);

    release.wait().await;
    let PollOutcome::Completed(state) = first.await.unwrap() else {
        panic!("held cycle should still complete");
    };
    assert_eq!(state.current_value(), Some(500.0));

    // With the cycle finished the guard is released: the next tick runs
    // a fetch instead of being skipped.
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.poll().await }
    });
    entered.wait().await;
    release.wait().await;
    assert!(matches!(
        second.await.unwrap(),
        PollOutcome::Completed(_)
    ));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_teardown_before_a_tick_cancels_without_fetching() {
    let (tx, rx) = watch::channel(false);
    let session = session(ScriptedFetcher::new(vec![Ok(ok_body())]), rx);

    tx.send(true).unwrap();
    assert_eq!(session.poll().await, PollOutcome::Cancelled);
    assert_eq!(session.snapshot(), AcquisitionState::default());
}

#[tokio::test]
async fn test_teardown_abandons_an_inflight_cycle_without_writing_state() {
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (tx, rx) = watch::channel(false);
    let session = Arc::new(session(
        GatedFetcher {
            entered: entered.clone(),
            release,
        },
        rx,
    ));

    let inflight = tokio::spawn({
        let session = session.clone();
        async move { session.poll().await }
    });

    entered.wait().await;
    tx.send(true).unwrap();

    assert_eq!(inflight.await.unwrap(), PollOutcome::Cancelled);
    assert_eq!(session.snapshot(), AcquisitionState::default());
}
