//! Upstream API clients.
//!
//! Submodules:
//! - `remap` — EU JRC REMap radiation timeseries API: URL construction,
//!   transport fetch, failure classification.

pub mod remap;
