//! Batch queue metrics
//!
//! Provider traits, snapshot types, and periodic usage reporting for batch
//! queues.
//!
//! # Overview
//!
//! This crate provides:
//! - [`QueueMetricsProvider`], implemented by each queue's metrics handle
//! - [`QueueCounters`] and [`QueueUsage`] snapshots
//! - Formatters for human-readable and JSON reports
//! - [`UsageReporter`], which samples providers on an interval and logs
//!   rates, total usage, and the hottest partitions
//!
//! # Metrics Handle Pattern
//!
//! Queues keep their counters behind an `Arc` and hand out a lightweight
//! handle implementing [`QueueMetricsProvider`]. The handle stays valid
//! after the queue shuts down.
//!
//! ```text
//! BatchQueue (owns Arc<QueueMetrics>)
//!     │
//!     └──► metrics_handle() → handle (clones Arc, implements provider)
//!
//! Wiring:
//!     1. Create queues
//!     2. Collect handles into Vec<Arc<dyn QueueMetricsProvider>>
//!     3. Build UsageReporter with the handles
//!     4. Spawn reporter.run(cancel)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use batchqueue_metrics::{ReporterConfig, UsageReporter};
//! use tokio_util::sync::CancellationToken;
//!
//! let reporter = UsageReporter::builder()
//!     .config(ReporterConfig::default())
//!     .queues(manager.metrics_providers())
//!     .build();
//! tokio::spawn(reporter.run(CancellationToken::new()));
//! ```

mod collected;
mod config;
pub mod format;
mod reporter;
mod traits;

pub use collected::{CollectedQueue, CollectedQueues, QueueRate, QueueRates};
pub use config::{ReportFormat, ReporterConfig};
pub use format::{HumanFormatter, JsonFormatter, MetricsFormatter};
pub use reporter::{UsageReporter, UsageReporterBuilder};
pub use traits::{QueueCounters, QueueMetricsProvider, QueueUsage};
