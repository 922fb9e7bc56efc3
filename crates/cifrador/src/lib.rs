//! cifrador - chord annotation front end
//!
//! This library provides:
//! - `omr`: Audiveris invocation (PDF → MusicXML)
//! - `job`: the scanned-score flow shared by `scan` and the HTTP service
//! - `serve`: axum routes and server loop
//! - `telemetry`: tracing subscriber setup

pub mod job;
pub mod omr;
pub mod serve;
pub mod telemetry;
