//! JSON report formatter
//!
//! # Example Output
//!
//! ```json
//! {
//!   "type": "batchqueue",
//!   "queues": [
//!     {
//!       "name": "METRICS_L1",
//!       "produced_per_sec": 1200,
//!       "used": 120,
//!       "capacity": 80000,
//!       "hot": [{ "partition": 4, "used": 50 }]
//!     }
//!   ]
//! }
//! ```

use serde::Serialize;

use super::MetricsFormatter;
use crate::{CollectedQueues, QueueRates};

/// JSON report formatter
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    queues: Vec<QueueJson<'a>>,
}

#[derive(Serialize)]
struct QueueJson<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    produced_per_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumed_per_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dropped: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handler_errors: Option<u64>,
    partitions: usize,
    used: usize,
    capacity: usize,
    used_percentage: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hot: Vec<HotJson>,
}

#[derive(Serialize)]
struct HotJson {
    partition: usize,
    used: usize,
}

impl MetricsFormatter for JsonFormatter {
    fn format_report(
        &self,
        collected: &CollectedQueues,
        rates: Option<&QueueRates>,
        top_partitions: usize,
    ) -> String {
        let Some(rates) = rates else {
            return r#"{"type":"batchqueue","status":"collecting_baseline"}"#.to_string();
        };

        let queues = collected
            .queues
            .iter()
            .map(|queue| {
                let rate = rates.queue(&queue.name);
                let usage = &queue.usage;
                QueueJson {
                    name: &queue.name,
                    produced_per_sec: rate.map(|r| r.produced_per_sec as u64),
                    consumed_per_sec: rate.map(|r| r.consumed_per_sec as u64),
                    dropped: rate.map(|r| r.dropped),
                    handler_errors: rate.map(|r| r.handler_errors),
                    partitions: usage.partition_count(),
                    used: usage.total_used(),
                    capacity: usage.capacity(),
                    used_percentage: usage.used_percentage(),
                    hot: usage
                        .hottest(top_partitions)
                        .into_iter()
                        .filter(|&(_, used)| used > 0)
                        .map(|(partition, used)| HotJson { partition, used })
                        .collect(),
                }
            })
            .collect();

        let json = ReportJson {
            report_type: "batchqueue",
            queues,
        };

        // Compact JSON, one log line per report
        serde_json::to_string(&json).unwrap_or_else(|_| "{}".to_string())
    }
}
