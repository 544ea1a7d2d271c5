//! Per-station polling session.
//!
//! A [`PollSession`] is the single mutator of one station's
//! [`AcquisitionState`]. The host's scheduler is expected to serialize
//! invocations per station, but a busy flag guards against overlap
//! anyway — a tick that fires while the previous cycle is still retrying
//! is skipped rather than run as a second concurrent fetch. Teardown is
//! a `watch` channel: an in-flight cycle is abandoned at its next
//! suspension point and never writes state afterwards.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::acquire::{Acquirer, TokenSource, poll_once};
use crate::ingest::remap::Fetch;
use crate::model::AcquisitionState;
use crate::stations::StationConfig;

/// Outcome of one session tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The cycle ran and state was updated.
    Completed(AcquisitionState),
    /// A previous cycle was still in flight; no fetch was issued.
    Skipped,
    /// Teardown was signaled before or during the cycle; state is
    /// untouched.
    Cancelled,
}

/// One station's polling session: config, state, transport, and token
/// source, bound to a shutdown signal owned by the host.
pub struct PollSession<F, T> {
    config: StationConfig,
    acquirer: Acquirer,
    fetcher: F,
    tokens: tokio::sync::Mutex<T>,
    state: Mutex<AcquisitionState>,
    busy: AtomicBool,
    shutdown: watch::Receiver<bool>,
}

impl<F, T> PollSession<F, T>
where
    F: Fetch,
    T: TokenSource,
{
    pub fn new(
        config: StationConfig,
        acquirer: Acquirer,
        fetcher: F,
        tokens: T,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        PollSession {
            config,
            acquirer,
            fetcher,
            tokens: tokio::sync::Mutex::new(tokens),
            state: Mutex::new(AcquisitionState::default()),
            busy: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// The state as of the last completed cycle.
    pub fn snapshot(&self) -> AcquisitionState {
        self.state.lock().unwrap().clone()
    }

    /// One scheduled tick.
    pub async fn poll(&self) -> PollOutcome {
        let Some(_busy) = self.claim() else {
            debug!(station = %self.config.station_code, "cycle in flight, tick skipped");
            return PollOutcome::Skipped;
        };

        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return PollOutcome::Cancelled;
        }

        let mut tokens = self.tokens.lock().await;
        let prior = self.snapshot();

        tokio::select! {
            next = poll_once(&self.acquirer, &self.fetcher, &mut *tokens, &self.config, &prior) => {
                *self.state.lock().unwrap() = next.clone();
                PollOutcome::Completed(next)
            }
            // Fires on teardown, or with the sender gone — either way the
            // host is done with this session.
            _ = shutdown.changed() => PollOutcome::Cancelled,
        }
    }

    /// Host-exposed action: an out-of-cycle tick, subject to the same
    /// overlap guard as a scheduled one.
    pub async fn force_refresh(&self) -> PollOutcome {
        self.poll().await
    }

    fn claim(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(BusyGuard(&self.busy))
    }
}

/// Clears the busy flag on every exit path, including cancellation.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
