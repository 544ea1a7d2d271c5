//! Core data types for the radiation station polling service.
//!
//! This module defines the shared domain model imported by all other
//! modules. It contains no I/O — only types, the per-cycle state
//! transitions applied to them, and the upstream payload key constants.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::{ExhaustedError, UpstreamError};

// ---------------------------------------------------------------------------
// Upstream payload keys
// ---------------------------------------------------------------------------

// The REMap timeseries schema is not formally documented; these are the key
// names the API has been observed to return. Kept in one place so a schema
// change upstream is a one-line fix.

/// Key of the raw numeric reading in a timeseries entry.
pub const KEY_VALUE: &str = "value";

/// Key of the entry's measurement timestamp.
pub const KEY_DATE: &str = "date";

/// Key of the station code echoed back by the API.
pub const KEY_CODE: &str = "code";

/// Key of the optional upstream status field.
pub const KEY_STATUS: &str = "status";

/// Unit of the normalized reading.
pub const UNIT_NANOSIEVERTS_PER_HOUR: &str = "nSv/h";

/// Upper bound on the raw-payload diagnostic retained in
/// [`AcquisitionState`], in characters.
pub const PAYLOAD_DIAGNOSTIC_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One decoded reading from the upstream API, before calibration.
///
/// Produced per fetch attempt by `decode` and discarded after
/// normalization. The metadata fields are best-effort: the API
/// intermittently returns garbled payloads, so a missing `date`, `code`,
/// or `status` is left unset rather than treated as fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    /// Raw (upstream-scaled) numeric value.
    pub value: f64,
    /// Measurement timestamp as reported upstream, ISO 8601.
    pub date: Option<String>,
    /// Station code echoed back by the API. May be encoded differently
    /// from the configured code; kept for diagnostics only.
    pub returned_code: Option<String>,
    /// Free-text status field, when present.
    pub status: Option<String>,
}

/// A reading after the calibration divisor has been applied, in nSv/h.
///
/// Immutable once produced. The inputs to the conversion are recorded
/// alongside the result so the host can display them as diagnostic
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    /// Calibrated value in nSv/h.
    pub value: f64,
    /// The raw value as returned by the API.
    pub raw_value: f64,
    /// Calibration stamp the divisor was derived from.
    pub stamp: u16,
    /// The divisor actually applied, `1001 - stamp`.
    pub divisor: f64,
}

// ---------------------------------------------------------------------------
// Acquisition state
// ---------------------------------------------------------------------------

/// Per-station bookkeeping across polling cycles.
///
/// Single-owner: created empty at session start and updated at most once
/// per poll cycle with either [`with_success`](Self::with_success) or
/// [`with_exhaustion`](Self::with_exhaustion). A run of failed cycles
/// keeps the last good reading visible (stale-but-present) so dependent
/// host automations never see a hard gap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionState {
    /// Last successfully acquired reading, if any cycle ever succeeded.
    pub last_good: Option<NormalizedReading>,
    /// When `last_good` was acquired (local clock).
    pub last_update: Option<DateTime<Utc>>,
    /// Upstream measurement timestamp of `last_good`, when reported.
    pub upstream_date: Option<String>,
    /// Error from the most recent failed cycle. Cleared on success.
    pub last_error: Option<UpstreamError>,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
    /// HTTP status of the most recent attempt that got a response.
    pub last_http_status: Option<u16>,
    /// Station code echoed by the API on the last success.
    pub returned_code: Option<String>,
    /// Upstream status field from the last success.
    pub upstream_status: Option<String>,
    /// Truncated raw payload from the last failed decode, for
    /// troubleshooting. At most [`PAYLOAD_DIAGNOSTIC_LIMIT`] characters.
    pub payload_diagnostic: Option<String>,
}

impl AcquisitionState {
    /// The value reported to the host, or `None` while no cycle has ever
    /// succeeded ("unavailable").
    pub fn current_value(&self) -> Option<f64> {
        self.last_good.as_ref().map(|r| r.value)
    }

    /// True when the visible value survived at least one failed cycle.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }

    /// State after a successful cycle: stores the reading, resets the
    /// failure counter, and records the cycle's diagnostics.
    pub fn with_success(
        &self,
        reading: NormalizedReading,
        raw: &RawReading,
        http_status: Option<u16>,
        now: DateTime<Utc>,
    ) -> AcquisitionState {
        AcquisitionState {
            last_good: Some(reading),
            last_update: Some(now),
            upstream_date: raw.date.clone(),
            last_error: None,
            consecutive_failures: 0,
            last_http_status: http_status,
            returned_code: raw.returned_code.clone(),
            upstream_status: raw.status.clone(),
            payload_diagnostic: None,
        }
    }

    /// State after an exhausted cycle: increments the failure counter and
    /// records the error, but keeps the last good reading and its
    /// timestamps visible.
    pub fn with_exhaustion(
        &self,
        err: ExhaustedError,
        http_status: Option<u16>,
        payload_diagnostic: Option<String>,
    ) -> AcquisitionState {
        AcquisitionState {
            last_good: self.last_good.clone(),
            last_update: self.last_update,
            upstream_date: self.upstream_date.clone(),
            last_error: Some(err.last),
            consecutive_failures: self.consecutive_failures + 1,
            last_http_status: http_status.or(self.last_http_status),
            returned_code: self.returned_code.clone(),
            upstream_status: self.upstream_status.clone(),
            payload_diagnostic: payload_diagnostic.or_else(|| self.payload_diagnostic.clone()),
        }
    }

    /// Diagnostic attributes for the host's display layer.
    ///
    /// Empty while no reading has ever been acquired. `returned_code` and
    /// `status` appear only when the upstream actually reported them.
    pub fn host_attributes(&self, station_code: &str) -> Value {
        let Some(reading) = &self.last_good else {
            return json!({});
        };

        let timestamp = self
            .upstream_date
            .clone()
            .or_else(|| self.last_update.map(|t| t.to_rfc3339()));

        let mut attrs = json!({
            "timestamp": timestamp,
            "station_code": station_code,
            "raw_value": reading.raw_value,
            "stamp": reading.stamp,
            "divisor": reading.divisor,
        });

        if let Some(code) = &self.returned_code {
            attrs["returned_code"] = json!(code);
        }
        if let Some(status) = &self.upstream_status {
            attrs["status"] = json!(status);
        }

        attrs
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExhaustedError, TransportError};
    use chrono::{TimeZone, Utc};

    fn reading(value: f64) -> NormalizedReading {
        NormalizedReading {
            value,
            raw_value: value * 501.0,
            stamp: 500,
            divisor: 501.0,
        }
    }

    fn raw_with_metadata() -> RawReading {
        RawReading {
            value: 250_500.0,
            date: Some("2026-08-01T12:00:00Z".to_string()),
            returned_code: Some("EE20395".to_string()),
            status: Some("ok".to_string()),
        }
    }

    fn exhausted() -> ExhaustedError {
        ExhaustedError {
            attempts: 3,
            last: TransportError::Timeout(std::time::Duration::from_secs(30)).into(),
        }
    }

    #[test]
    fn test_fresh_state_is_unavailable_and_not_stale() {
        let state = AcquisitionState::default();
        assert_eq!(state.current_value(), None);
        assert!(!state.is_stale());
        assert_eq!(state.host_attributes("EE20395"), serde_json::json!({}));
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let prior = AcquisitionState {
            consecutive_failures: 4,
            ..AcquisitionState::default()
        };
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let next = prior.with_success(reading(500.0), &raw_with_metadata(), Some(200), now);

        assert_eq!(next.current_value(), Some(500.0));
        assert_eq!(next.consecutive_failures, 0);
        assert!(!next.is_stale());
        assert_eq!(next.last_update, Some(now));
        assert_eq!(next.last_http_status, Some(200));
        assert_eq!(next.last_error, None);
    }

    #[test]
    fn test_exhaustion_keeps_last_good_value() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let good = AcquisitionState::default().with_success(
            reading(5.0),
            &raw_with_metadata(),
            Some(200),
            now,
        );

        let next = good.with_exhaustion(exhausted(), Some(503), None);
        assert_eq!(next.current_value(), Some(5.0));
        assert_eq!(next.consecutive_failures, 1);
        assert!(next.is_stale());
        assert!(next.last_error.is_some());
        assert_eq!(next.last_update, Some(now));
        assert_eq!(next.last_http_status, Some(503));
    }

    #[test]
    fn test_exhaustion_counter_accumulates() {
        let mut state = AcquisitionState::default();
        for expected in 1..=3 {
            state = state.with_exhaustion(exhausted(), None, None);
            assert_eq!(state.consecutive_failures, expected);
        }
        assert_eq!(state.current_value(), None);
    }

    #[test]
    fn test_host_attributes_include_optional_fields_only_when_present() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

        let with_meta = AcquisitionState::default().with_success(
            reading(500.0),
            &raw_with_metadata(),
            Some(200),
            now,
        );
        let attrs = with_meta.host_attributes("EE20395");
        assert_eq!(attrs["station_code"], "EE20395");
        assert_eq!(attrs["raw_value"], 250_500.0);
        assert_eq!(attrs["stamp"], 500);
        assert_eq!(attrs["divisor"], 501.0);
        assert_eq!(attrs["returned_code"], "EE20395");
        assert_eq!(attrs["status"], "ok");
        assert_eq!(attrs["timestamp"], "2026-08-01T12:00:00Z");

        let bare_raw = RawReading {
            value: 1.0,
            date: None,
            returned_code: None,
            status: None,
        };
        let bare = AcquisitionState::default().with_success(reading(1.0), &bare_raw, None, now);
        let attrs = bare.host_attributes("EE20395");
        assert!(attrs.get("returned_code").is_none());
        assert!(attrs.get("status").is_none());
        // Falls back to the acquisition clock when upstream omits a date.
        assert_eq!(attrs["timestamp"], now.to_rfc3339());
    }
}
