//! Usage domain - log records, aggregates, billing periods and pricing

mod aggregation;
mod period;
mod pricing;
mod record;
mod repository;

pub use aggregation::{BreakdownTotals, UsageAggregation, UsageTotals};
pub use period::{first_of_next_month, AggregationKey, PeriodKey, TenantBucket};
pub use pricing::{
    audio_cost_micros, estimate_cost_micros, image_cost_micros, token_cost_micros, TokenRates,
};
pub use record::{
    CallContext, CallPerformance, CallStatus, CallType, ResourceUnits, TokenUsage, UsageDraft,
    UsageLogEntry, UsageLogId,
};
pub use repository::{AggregationUpdate, AtomicCounterStore, UsageLogRepository};
