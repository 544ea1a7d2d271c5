//! Station configuration for the radiation polling service.
//!
//! A [`StationConfig`] is the immutable per-installation record: station
//! code, display name, poll interval, and the calibration stamp fixed at
//! setup time. This module is the single place configuration is created
//! and validated — all other modules receive an already-valid config.
//!
//! Station definitions come either from the host (`configure`) or from a
//! `stations.toml` file (`load_stations`). Stamps are generated fresh at
//! configure/load time and never persisted; changing the station code or
//! regenerating the stamp means a new session with fresh state.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::calibrate::{STAMP_MAX, STAMP_MIN, generate_stamp};
use crate::error::ConfigError;

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 60;

/// Poll interval used when a station entry does not specify one.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Station configuration
// ---------------------------------------------------------------------------

/// Immutable per-installation station record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// Upstream identifier of the monitoring sensor, e.g. "EE20395".
    pub station_code: String,
    /// Free-text name shown by the host.
    pub display_name: String,
    /// Scheduled polling period.
    pub poll_interval_secs: u64,
    /// Calibration stamp, fixed for the life of the session.
    pub stamp: u16,
}

impl StationConfig {
    /// Builds a config with an explicit stamp, validating every field.
    ///
    /// Normal setup goes through [`configure`], which draws the stamp from
    /// an injected randomness source; this constructor exists for tests
    /// and for hosts that manage stamps themselves.
    pub fn with_stamp(
        station_code: &str,
        display_name: &str,
        poll_interval_secs: u64,
        stamp: u16,
    ) -> Result<StationConfig, ConfigError> {
        if station_code.trim().is_empty() {
            return Err(ConfigError::EmptyStationCode);
        }
        if !(STAMP_MIN..=STAMP_MAX).contains(&stamp) {
            return Err(ConfigError::StampOutOfRange(stamp));
        }
        if poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            return Err(ConfigError::IntervalTooShort(poll_interval_secs));
        }

        Ok(StationConfig {
            station_code: station_code.trim().to_string(),
            display_name: display_name.to_string(),
            poll_interval_secs,
            stamp,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Creates a station config, fixing a fresh calibration stamp.
///
/// This is the setup-time entry point: the stamp drawn here is used for
/// the whole life of the integration session. Validation failures are the
/// only errors that propagate synchronously to the host.
pub fn configure<R: Rng>(
    station_code: &str,
    display_name: &str,
    poll_interval_secs: u64,
    rng: &mut R,
) -> Result<StationConfig, ConfigError> {
    let stamp = generate_stamp(rng);
    StationConfig::with_stamp(station_code, display_name, poll_interval_secs, stamp)
}

// ---------------------------------------------------------------------------
// Station file loading
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StationsFile {
    #[serde(default)]
    station: Vec<StationEntry>,
}

/// One `[[station]]` table in `stations.toml`.
#[derive(Debug, Deserialize)]
struct StationEntry {
    code: String,
    name: String,
    poll_interval_secs: Option<u64>,
}

/// Loads station definitions from a TOML file and configures each one.
pub fn load_stations<R: Rng>(path: &str, rng: &mut R) -> Result<Vec<StationConfig>, ConfigError> {
    let text =
        std::fs::read_to_string(path).map_err(|err| ConfigError::UnreadableStationFile {
            path: path.to_string(),
            detail: err.to_string(),
        })?;
    parse_stations(&text, path, rng)
}

fn parse_stations<R: Rng>(
    text: &str,
    path: &str,
    rng: &mut R,
) -> Result<Vec<StationConfig>, ConfigError> {
    let file: StationsFile =
        toml::from_str(text).map_err(|err| ConfigError::MalformedStationFile {
            path: path.to_string(),
            detail: err.to_string(),
        })?;

    file.station
        .iter()
        .map(|entry| {
            configure(
                &entry.code,
                &entry.name,
                entry.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                rng,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
