pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryAggregationStore, InMemoryUsageLogRepository};
pub use postgres::{ensure_schema, PostgresAggregationStore, PostgresUsageLogRepository};
