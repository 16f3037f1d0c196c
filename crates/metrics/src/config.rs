//! Usage reporter configuration
//!
//! # Defaults
//!
//! - `enabled`: true
//! - `interval`: 60s
//! - `format`: human
//! - `top_partitions`: 3

use std::time::Duration;

use serde::Deserialize;

/// Report output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

/// Reporter configuration
///
/// # Example
///
/// ```toml
/// [reporter]
/// enabled = true
/// interval = "30s"
/// format = "json"
/// top_partitions = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Enable periodic reporting
    pub enabled: bool,

    /// Reporting interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Output format (human, json)
    pub format: ReportFormat,

    /// Hottest partitions listed per queue; 0 disables the listing
    pub top_partitions: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            format: ReportFormat::Human,
            top_partitions: 3,
        }
    }
}
