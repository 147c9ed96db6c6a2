//! DSMR P1 to Prometheus bridge.
//!
//! Reads telegrams from a Dutch smart meter's P1 serial port, decodes them
//! against a per-version field specification and keeps the latest value of
//! each reading in a registry that a Prometheus server scrapes over HTTP.

pub mod api;
pub mod dsmr;
pub mod metrics;

// Re-export common types for easier access
pub use api::ApiManager;
pub use dsmr::reader::TelegramReader;
pub use dsmr::serial::SerialSettings;
pub use dsmr::{DsmrError, DsmrManager};
pub use metrics::MetricRegistry;

pub fn get_unix_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
