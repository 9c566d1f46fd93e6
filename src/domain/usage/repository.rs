//! Usage log and aggregation store contracts

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::MeteringError;

use super::aggregation::UsageAggregation;
use super::period::{AggregationKey, PeriodKey, TenantBucket};
use super::record::{UsageLogEntry, UsageLogId};

/// Append-only store for usage-log entries
#[async_trait]
pub trait UsageLogRepository: Send + Sync + Debug {
    /// Persist one immutable entry
    async fn append(&self, entry: UsageLogEntry) -> Result<(), MeteringError>;

    /// Fetch an entry by id
    async fn get(&self, id: &UsageLogId) -> Result<Option<UsageLogEntry>, MeteringError>;

    /// All entries for one tenant bucket in one period
    async fn list_for_period(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
    ) -> Result<Vec<UsageLogEntry>, MeteringError>;

    /// Number of persisted entries
    async fn count(&self) -> Result<usize, MeteringError>;
}

/// Update closure applied to an aggregation document inside a transaction.
/// May run more than once under optimistic retry, so it must be a pure
/// fold over the given document.
pub type AggregationUpdate<'a> = &'a (dyn Fn(&mut UsageAggregation) + Send + Sync);

/// Transactional per-document counter store
///
/// The contract: N concurrent `transact` calls against the same key produce
/// exactly N applications with no lost updates. Implementations use the
/// backend's native row/document transaction (`SELECT ... FOR UPDATE`) or an
/// optimistic compare-and-swap retry loop. Plain read-modify-write is not a
/// valid implementation.
#[async_trait]
pub trait AtomicCounterStore: Send + Sync + Debug {
    /// Atomically apply `update` to the document for `key`, creating the
    /// document from [`UsageAggregation::empty`] when absent. Returns the
    /// committed state.
    async fn transact(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
        update: AggregationUpdate<'_>,
    ) -> Result<UsageAggregation, MeteringError>;

    /// Read the current document, `None` if no usage was recorded yet
    async fn get(&self, key: &AggregationKey) -> Result<Option<UsageAggregation>, MeteringError>;

    /// All aggregation documents, across tenants and periods
    async fn list(&self) -> Result<Vec<UsageAggregation>, MeteringError>;
}
