//! Human-readable report formatter
//!
//! One line per queue, compact enough for operators tailing logs.
//!
//! # Example Output
//!
//! ```text
//! [batchqueue] METRICS_L1: in 1.2K/s | out 1.2K/s | used 160/80.0K (0.2%) | hot p4=90 p3=40
//! [batchqueue] TOPN_PERSIST: in 40/s | out 40/s | used 0/10.0K (0.0%) | dropped 12 | errors 1
//! ```

use std::fmt::Write;

use super::{MetricsFormatter, format_count, format_percent, format_rate};
use crate::{CollectedQueue, CollectedQueues, QueueRate, QueueRates};

/// Human-readable report formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new() -> Self {
        Self
    }

    fn format_queue(
        &self,
        queue: &CollectedQueue,
        rate: Option<&QueueRate>,
        top_partitions: usize,
    ) -> String {
        let mut output = format!("[batchqueue] {}:", queue.name);

        match rate {
            Some(rate) => {
                let _ = write!(
                    output,
                    " in {} | out {} |",
                    format_rate(rate.produced_per_sec),
                    format_rate(rate.consumed_per_sec),
                );
            }
            None => output.push_str(" new |"),
        }

        let usage = &queue.usage;
        let _ = write!(
            output,
            " used {}/{} ({})",
            usage.total_used(),
            format_count(usage.capacity() as u64),
            format_percent(usage.used_percentage()),
        );

        let hot: Vec<_> = usage
            .hottest(top_partitions)
            .into_iter()
            .filter(|&(_, used)| used > 0)
            .collect();
        if !hot.is_empty() {
            output.push_str(" | hot");
            for (index, used) in hot {
                let _ = write!(output, " p{index}={used}");
            }
        }

        if let Some(rate) = rate {
            if rate.dropped > 0 {
                let _ = write!(output, " | dropped {}", format_count(rate.dropped));
            }
            if rate.rejected > 0 {
                let _ = write!(output, " | rejected {}", format_count(rate.rejected));
            }
            if rate.handler_errors > 0 {
                let _ = write!(output, " | errors {}", rate.handler_errors);
            }
        }

        output
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format_report(
        &self,
        collected: &CollectedQueues,
        rates: Option<&QueueRates>,
        top_partitions: usize,
    ) -> String {
        let Some(rates) = rates else {
            return "[batchqueue] collecting baseline...".to_string();
        };
        if collected.queues.is_empty() {
            return "[batchqueue] no queues".to_string();
        }

        collected
            .queues
            .iter()
            .map(|queue| self.format_queue(queue, rates.queue(&queue.name), top_partitions))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
