//! Usage recording: price the call, append the log entry, fold the counters

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::warn;

use crate::domain::usage::{
    estimate_cost_micros, AtomicCounterStore, UsageAggregation, UsageDraft, UsageLogEntry,
    UsageLogId, UsageLogRepository,
};
use crate::domain::MeteringError;

/// Outcome of a successful recording
#[derive(Debug, Clone)]
pub struct RecordedUsage {
    pub entry: UsageLogEntry,
    /// Aggregation state after this entry was folded in
    pub aggregation: UsageAggregation,
}

/// Writes usage to both stores: the append-only log first, then the
/// transactional counter fold. The log append is the source of truth; a
/// counter fold that fails after a successful append is surfaced as an
/// error so rollup repair can reconcile from the log.
#[derive(Debug)]
pub struct UsageRecorder {
    log: Arc<dyn UsageLogRepository>,
    counters: Arc<dyn AtomicCounterStore>,
}

impl UsageRecorder {
    pub fn new(log: Arc<dyn UsageLogRepository>, counters: Arc<dyn AtomicCounterStore>) -> Self {
        Self { log, counters }
    }

    /// Seal and persist one usage draft
    pub async fn log_usage(&self, draft: UsageDraft) -> Result<RecordedUsage, MeteringError> {
        let now = Utc::now();
        let cost_micros = estimate_cost_micros(&draft.model, &draft.units);
        let entry = UsageLogEntry::from_draft(UsageLogId::generate(), draft, cost_micros, now);

        self.log.append(entry.clone()).await?;

        let fold_entry = entry.clone();
        let aggregation = self
            .counters
            .transact(&entry.bucket, &entry.period, &move |document| {
                document.apply(&fold_entry)
            })
            .await?;

        let labels = [
            ("call_type", entry.call_type.to_string()),
            ("status", entry.status.to_string()),
        ];
        counter!("metering_calls_total", &labels).increment(1);
        counter!("metering_tokens_total", &labels).increment(entry.units.tokens.total());
        counter!("metering_cost_micros_total", &labels).increment(entry.cost_micros.max(0) as u64);

        Ok(RecordedUsage { entry, aggregation })
    }

    /// Recording variant for paths where the provider call already happened:
    /// failures are logged and counted, never surfaced to the caller.
    pub async fn log_usage_best_effort(&self, draft: UsageDraft) -> Option<RecordedUsage> {
        match self.log_usage(draft).await {
            Ok(recorded) => Some(recorded),
            Err(e) => {
                warn!(error = %e, "Failed to record usage, call result is kept");
                counter!("metering_record_failures_total").increment(1);

                None
            }
        }
    }
}
