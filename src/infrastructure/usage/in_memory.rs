//! In-memory usage log and aggregation store implementations

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::usage::{
    AggregationKey, AggregationUpdate, AtomicCounterStore, PeriodKey, TenantBucket,
    UsageAggregation, UsageLogEntry, UsageLogId, UsageLogRepository,
};
use crate::domain::MeteringError;

/// In-memory append-only usage log
#[derive(Debug, Default)]
pub struct InMemoryUsageLogRepository {
    entries: RwLock<HashMap<UsageLogId, UsageLogEntry>>,
}

impl InMemoryUsageLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLogRepository for InMemoryUsageLogRepository {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), MeteringError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if entries.contains_key(entry.id()) {
            return Err(MeteringError::conflict(format!(
                "Usage entry '{}' already recorded",
                entry.id()
            )));
        }

        entries.insert(entry.id().clone(), entry);
        Ok(())
    }

    async fn get(&self, id: &UsageLogId) -> Result<Option<UsageLogEntry>, MeteringError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(entries.get(id).cloned())
    }

    async fn list_for_period(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
    ) -> Result<Vec<UsageLogEntry>, MeteringError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        let mut results: Vec<_> = entries
            .values()
            .filter(|e| &e.bucket == bucket && &e.period == period)
            .cloned()
            .collect();

        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(results)
    }

    async fn count(&self) -> Result<usize, MeteringError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(entries.len())
    }
}

/// In-memory aggregation store with optimistic compare-and-swap updates
///
/// Each `transact` snapshots the document, applies the update to the copy
/// and commits only if the stored version is unchanged, retrying otherwise.
/// This mirrors how a CAS-capable KV backend would behave and keeps the
/// no-lost-updates contract observable in tests.
#[derive(Debug, Default)]
pub struct InMemoryAggregationStore {
    documents: RwLock<HashMap<AggregationKey, UsageAggregation>>,
}

impl InMemoryAggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current document copy plus its stored version, `None` when absent
    fn snapshot(
        &self,
        key: &AggregationKey,
        bucket: &TenantBucket,
        period: &PeriodKey,
    ) -> Result<(UsageAggregation, Option<u64>), MeteringError> {
        let documents = self
            .documents
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(match documents.get(key) {
            Some(doc) => (doc.clone(), Some(doc.version)),
            None => (
                UsageAggregation::empty(bucket.clone(), period.clone()),
                None,
            ),
        })
    }

    /// Commit only if the stored version still matches the snapshot
    fn try_commit(
        &self,
        candidate: UsageAggregation,
        expected: Option<u64>,
    ) -> Result<bool, MeteringError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if documents.get(candidate.key()).map(|d| d.version) != expected {
            return Ok(false);
        }

        documents.insert(candidate.key().clone(), candidate);
        Ok(true)
    }
}

#[async_trait]
impl AtomicCounterStore for InMemoryAggregationStore {
    async fn transact(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
        update: AggregationUpdate<'_>,
    ) -> Result<UsageAggregation, MeteringError> {
        let key = AggregationKey::new(bucket, period);

        loop {
            let (mut candidate, expected) = self.snapshot(&key, bucket, period)?;
            update(&mut candidate);
            candidate.version += 1;

            if self.try_commit(candidate.clone(), expected)? {
                return Ok(candidate);
            }
            // Version raced with a concurrent writer; take a fresh snapshot
            tokio::task::yield_now().await;
        }
    }

    async fn get(&self, key: &AggregationKey) -> Result<Option<UsageAggregation>, MeteringError> {
        let documents = self
            .documents
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(documents.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<UsageAggregation>, MeteringError> {
        let documents = self
            .documents
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(documents.values().cloned().collect())
    }
}
