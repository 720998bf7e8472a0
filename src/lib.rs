//! Market Dashboard Library
//!
//! Market data fetchers, analytics and HTML report generators behind a
//! scheduled dashboard pipeline.

pub mod analytics;
pub mod config;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod types;
pub mod volume_profile;

#[cfg(feature = "dashboard")]
pub mod dashboard;
