//! REMap (EU JRC Radiological Monitoring) API client.
//!
//! Retrieves raw radiation timeseries for a station from the European
//! Commission Joint Research Centre's REMap service. The API is public
//! and unauthenticated; station codes can be looked up at
//! <https://remap.jrc.ec.europa.eu/Advanced.aspx>.
//!
//! The transport layer does exactly one request per call and classifies
//! failures; retry policy belongs to the retry controller. Intermediary
//! caches between here and the API have been observed to serve stale
//! bodies, so every request carries a random anti-cache query parameter.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TransportError;

/// Base endpoint of the REMap timeseries service.
pub const REMAP_BASE_URL: &str = "https://remap.jrc.ec.europa.eu";

/// Trailing window requested per poll. The upstream backfills slowly, so
/// a narrow window intermittently comes back empty; three days is wide
/// enough to always include the newest published reading.
pub const FETCH_WINDOW_HOURS: i64 = 72;

/// Timestamp format the timeseries path segments expect, UTC.
const URL_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Header carrying the calibration stamp; the upstream scales raw values
/// by the matching divisor.
pub const STAMP_HEADER: &str = "stamp";

/// Per-request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Fetch contract
// ---------------------------------------------------------------------------

/// Raw result of one successful request: HTTP status plus the unparsed
/// body. Decoding is a separate concern — the body may be garbled or in
/// an unknown encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFetch {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport seam between the retry controller and the network.
///
/// One call, one request: implementations must not retry internally. The
/// anti-cache token is freshly generated by the caller per attempt.
pub trait Fetch {
    fn fetch(
        &self,
        station_code: &str,
        anti_cache_token: u64,
        stamp: u16,
    ) -> impl Future<Output = Result<RawFetch, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Builds the timeseries URL for one station over an explicit window.
///
/// The `_` parameter is the anti-cache token; it defeats intermediary
/// HTTP caching without affecting the query.
pub fn build_timeseries_url(
    station_code: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    anti_cache_token: u64,
) -> String {
    format!(
        "{}/api/timeseries/v1/stations/timeseries/{}/{}?codes={}&_={:016x}",
        REMAP_BASE_URL,
        start.format(URL_TIMESTAMP_FORMAT),
        end.format(URL_TIMESTAMP_FORMAT),
        station_code,
        anti_cache_token,
    )
}

/// The trailing fetch window ending at `now`.
pub fn fetch_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - chrono::Duration::hours(FETCH_WINDOW_HOURS), now)
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Thin wrapper over a shared `reqwest::Client` with a per-request
/// timeout. Cheap to clone; one instance serves every station.
#[derive(Debug, Clone)]
pub struct RemapClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemapClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(RemapClient { client, timeout })
    }

    pub fn with_default_timeout() -> Result<Self, reqwest::Error> {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Fetch for RemapClient {
    async fn fetch(
        &self,
        station_code: &str,
        anti_cache_token: u64,
        stamp: u16,
    ) -> Result<RawFetch, TransportError> {
        let (start, end) = fetch_window(Utc::now());
        let url = build_timeseries_url(station_code, start, end, anti_cache_token);

        let response = self
            .client
            .get(&url)
            .header(STAMP_HEADER, stamp.to_string())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| classify_request_error(err, self.timeout))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(TransportError::HttpError(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| classify_request_error(err, self.timeout))?;

        Ok(RawFetch {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify_request_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::ConnectionFailure(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
