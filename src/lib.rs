//! Radiation station polling service.
//!
//! Polls the EU JRC REMap radiation-monitoring API for configured
//! stations, decodes the possibly garbled response, converts the raw
//! reading into nSv/h via a per-installation calibration stamp, and
//! keeps per-station acquisition state (last-good value, staleness,
//! diagnostics) for a host application.
//!
//! The acquisition pipeline per poll cycle:
//!
//!   fetch (`ingest::remap`) → decode (`decode`) → normalize
//!   (`calibrate`), driven by the retry controller (`acquire`) and
//!   bookkept into `model::AcquisitionState` by a `session::PollSession`.
//!
//! The binary in `main.rs` is a thin driver standing in for the host's
//! scheduler; all behavior lives here so a real host can embed it.

pub mod acquire;
pub mod calibrate;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod session;
pub mod stations;
pub mod verify;
