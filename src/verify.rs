//! Station-code verification.
//!
//! Best-effort live check of a station code against the REMap API at
//! setup time, before a polling session is created. Verification is
//! deliberately permissive: a station that is temporarily dark or behind
//! a flaky cache should still be configurable, so only the report's
//! status distinguishes "returning data" from "responsive but empty" —
//! nothing here hard-rejects a code.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::remap::build_timeseries_url;
use crate::model::{KEY_DATE, KEY_VALUE};

/// Window checked during verification. Narrower than the polling window —
/// this only needs to establish that the code resolves, not to find the
/// newest reading.
pub const VERIFY_WINDOW_HOURS: i64 = 1;

/// Per-request timeout for verification calls.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Verification results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    /// The API returned timeseries entries for the code.
    Success,
    /// The API was reachable but returned no usable data — possibly a
    /// valid station with temporarily nothing published.
    PartialSuccess,
    /// The API could not be reached at all.
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationVerification {
    pub station_code: String,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    pub http_status: Option<u16>,
    /// Timeseries entries returned over the verification window.
    pub entry_count: usize,
    /// `date` of the newest returned entry, when present.
    pub newest_entry_date: Option<String>,
    /// Whether the newest entry carried a numeric value field.
    pub value_field_present: bool,
    pub error_message: Option<String>,
}

impl StationVerification {
    /// Whether setup should accept this code.
    ///
    /// Always true: even an unreachable API may be a transient outage,
    /// and a misconfigured code can be removed later. The report exists
    /// to inform the host, not to gate it.
    pub fn allows_configuration(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Verification runner
// ---------------------------------------------------------------------------

/// Checks a station code against the live API.
///
/// The stamp sent here is a throwaway — verification happens before the
/// session's stamp is fixed, and the scaled magnitudes are irrelevant to
/// whether the code resolves.
pub async fn verify_station(
    client: &reqwest::Client,
    station_code: &str,
    anti_cache_token: u64,
    stamp: u16,
) -> StationVerification {
    let mut result = StationVerification {
        station_code: station_code.to_string(),
        status: VerificationStatus::Failed,
        api_responsive: false,
        http_status: None,
        entry_count: 0,
        newest_entry_date: None,
        value_field_present: false,
        error_message: None,
    };

    let end = Utc::now();
    let start = end - chrono::Duration::hours(VERIFY_WINDOW_HOURS);
    let url = build_timeseries_url(station_code, start, end, anti_cache_token);

    let response = match client
        .get(&url)
        .header(crate::ingest::remap::STAMP_HEADER, stamp.to_string())
        .timeout(VERIFY_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            result.error_message = Some(format!("request failed: {err}"));
            return result;
        }
    };

    result.api_responsive = true;
    result.http_status = Some(response.status().as_u16());

    if !response.status().is_success() {
        result.status = VerificationStatus::PartialSuccess;
        result.error_message = Some(format!("HTTP {}", response.status()));
        return result;
    }

    // Walk the body as untyped JSON — verification should survive schema
    // drift that would trip the strict decoder.
    match response.json::<serde_json::Value>().await {
        Ok(json) => {
            if let Some(entries) = json.as_array() {
                result.entry_count = entries.len();
                if let Some(last) = entries.last() {
                    result.newest_entry_date = last
                        .get(KEY_DATE)
                        .and_then(|date| date.as_str())
                        .map(str::to_string);
                    result.value_field_present =
                        last.get(KEY_VALUE).and_then(|value| value.as_f64()).is_some();
                }
            }

            result.status = if result.entry_count > 0 {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
        }
        Err(err) => {
            result.status = VerificationStatus::PartialSuccess;
            result.error_message = Some(format!("parse error: {err}"));
        }
    }

    result
}
