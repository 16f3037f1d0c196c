//! Periodic queue usage reporter
//!
//! Samples every registered [`QueueMetricsProvider`] at the configured
//! interval, computes per-interval rates against the previous sample, and
//! logs the formatted report through tracing.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    CollectedQueue, CollectedQueues, HumanFormatter, JsonFormatter, MetricsFormatter,
    QueueMetricsProvider, ReportFormat, ReporterConfig,
};

/// Builder for [`UsageReporter`]
#[derive(Default)]
pub struct UsageReporterBuilder {
    config: Option<ReporterConfig>,
    queues: Vec<Arc<dyn QueueMetricsProvider>>,
}

impl UsageReporterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reporter configuration
    pub fn config(mut self, config: ReporterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register one queue
    pub fn queue(mut self, provider: Arc<dyn QueueMetricsProvider>) -> Self {
        self.queues.push(provider);
        self
    }

    /// Register several queues
    pub fn queues(mut self, providers: Vec<Arc<dyn QueueMetricsProvider>>) -> Self {
        self.queues.extend(providers);
        self
    }

    /// Build the reporter
    pub fn build(self) -> UsageReporter {
        let config = self.config.unwrap_or_default();
        let formatter: Box<dyn MetricsFormatter> = match config.format {
            ReportFormat::Human => Box::new(HumanFormatter::new()),
            ReportFormat::Json => Box::new(JsonFormatter::new()),
        };

        UsageReporter {
            config,
            formatter,
            queues: self.queues,
            previous: None,
        }
    }
}

/// Periodic usage reporter for batch queues
pub struct UsageReporter {
    config: ReporterConfig,
    formatter: Box<dyn MetricsFormatter>,
    queues: Vec<Arc<dyn QueueMetricsProvider>>,
    previous: Option<CollectedQueues>,
}

impl UsageReporter {
    /// Create a new builder
    pub fn builder() -> UsageReporterBuilder {
        UsageReporterBuilder::new()
    }

    /// Run the reporter until cancellation
    ///
    /// Spawn this as a tokio task. Returns immediately when disabled.
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("queue usage reporting disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            format = ?self.config.format,
            queues = self.queues.len(),
            "queue usage reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("queue usage reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report_once();
                }
            }
        }
    }

    /// Collect, format, and log one report, returning the formatted text
    pub fn report_once(&mut self) -> String {
        let collected = self.collect();
        let rates = self.previous.as_ref().and_then(|prev| collected.rates(prev));

        let output =
            self.formatter
                .format_report(&collected, rates.as_ref(), self.config.top_partitions);

        for line in output.lines() {
            info!("{}", line);
        }

        self.previous = Some(collected);
        output
    }

    /// Sample every registered provider
    fn collect(&self) -> CollectedQueues {
        CollectedQueues {
            timestamp: Some(Instant::now()),
            queues: self
                .queues
                .iter()
                .map(|q| CollectedQueue {
                    name: q.name().to_string(),
                    counters: q.counters(),
                    usage: q.usage(),
                })
                .collect(),
        }
    }

    /// Add a queue after construction
    pub fn add_queue(&mut self, provider: Arc<dyn QueueMetricsProvider>) {
        self.queues.push(provider);
    }
}
