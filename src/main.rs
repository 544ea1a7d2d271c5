use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{info, warn};

use radmon_service::acquire::{Acquirer, RandomTokens, TokenSource};
use radmon_service::ingest::remap::{Fetch, RemapClient};
use radmon_service::logging;
use radmon_service::session::{PollOutcome, PollSession};
use radmon_service::stations;

const STATIONS_FILE: &str = "stations.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let mut rng = StdRng::from_entropy();
    let configs = stations::load_stations(STATIONS_FILE, &mut rng)?;
    if configs.is_empty() {
        anyhow::bail!("no stations configured in {STATIONS_FILE}");
    }

    let client = RemapClient::with_default_timeout()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut workers = Vec::new();
    for config in configs {
        info!(
            station = %config.station_code,
            name = %config.display_name,
            interval_secs = config.poll_interval_secs,
            "starting poll loop"
        );
        let session = Arc::new(PollSession::new(
            config,
            Acquirer::default(),
            client.clone(),
            RandomTokens::new(),
            shutdown_rx.clone(),
        ));
        workers.push(tokio::spawn(run_station(session, shutdown_rx.clone())));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn run_station<F, T>(session: Arc<PollSession<F, T>>, mut shutdown: watch::Receiver<bool>)
where
    F: Fetch + Send + Sync + 'static,
    T: TokenSource + Send + 'static,
{
    // The first tick fires immediately, so a fresh station reports a
    // value without waiting out a full interval.
    let mut interval = tokio::time::interval(session.config().poll_interval());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match session.poll().await {
                    PollOutcome::Completed(state) => info!(
                        station = %session.config().station_code,
                        value = ?state.current_value(),
                        stale = state.is_stale(),
                        failures = state.consecutive_failures,
                        "poll complete"
                    ),
                    PollOutcome::Skipped => warn!(
                        station = %session.config().station_code,
                        "tick overlapped a running cycle"
                    ),
                    PollOutcome::Cancelled => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
