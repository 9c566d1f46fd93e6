//! PostgreSQL usage log and aggregation store implementations
//!
//! The aggregation store fulfils the atomic-counter contract with a
//! row-level lock: every update runs inside a transaction that first makes
//! sure the row exists, then takes `SELECT ... FOR UPDATE` on it.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::storage::StorageKey;
use crate::domain::usage::{
    AggregationKey, AggregationUpdate, AtomicCounterStore, PeriodKey, TenantBucket,
    UsageAggregation, UsageLogEntry, UsageLogId, UsageLogRepository,
};
use crate::domain::MeteringError;

/// Create the metering tables if they do not exist yet
pub async fn ensure_schema(pool: &PgPool) -> Result<(), MeteringError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_log (
            id TEXT PRIMARY KEY,
            bucket TEXT NOT NULL,
            period TEXT NOT NULL,
            payload JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| MeteringError::storage(format!("Failed to create usage_log table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_aggregation (
            key TEXT PRIMARY KEY,
            payload JSONB NOT NULL,
            version BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        MeteringError::storage(format!("Failed to create usage_aggregation table: {}", e))
    })?;

    Ok(())
}

/// PostgreSQL implementation of the append-only usage log
#[derive(Debug, Clone)]
pub struct PostgresUsageLogRepository {
    pool: PgPool,
}

impl PostgresUsageLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogRepository for PostgresUsageLogRepository {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), MeteringError> {
        let payload = serde_json::to_value(&entry)
            .map_err(|e| MeteringError::internal(format!("Failed to serialize entry: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO usage_log (id, bucket, period, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id().as_str())
        .bind(entry.bucket.slug())
        .bind(entry.period.as_str())
        .bind(payload)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();

            if msg.contains("duplicate key") || msg.contains("unique constraint") {
                MeteringError::conflict(format!("Usage entry '{}' already recorded", entry.id()))
            } else {
                MeteringError::storage(format!("Failed to append usage entry: {}", e))
            }
        })?;

        Ok(())
    }

    async fn get(&self, id: &UsageLogId) -> Result<Option<UsageLogEntry>, MeteringError> {
        let row = sqlx::query("SELECT payload FROM usage_log WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to get usage entry: {}", e)))?;

        match row {
            Some(row) => Ok(Some(row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_for_period(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
    ) -> Result<Vec<UsageLogEntry>, MeteringError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM usage_log
            WHERE bucket = $1 AND period = $2
            ORDER BY created_at
            "#,
        )
        .bind(bucket.slug())
        .bind(period.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MeteringError::storage(format!("Failed to list usage entries: {}", e)))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn count(&self) -> Result<usize, MeteringError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to count usage entries: {}", e)))?;

        Ok(count as usize)
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<UsageLogEntry, MeteringError> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| MeteringError::storage(format!("Missing payload column: {}", e)))?;

    serde_json::from_value(payload)
        .map_err(|e| MeteringError::internal(format!("Failed to deserialize entry: {}", e)))
}

/// PostgreSQL implementation of the transactional aggregation store
#[derive(Debug, Clone)]
pub struct PostgresAggregationStore {
    pool: PgPool,
}

impl PostgresAggregationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AtomicCounterStore for PostgresAggregationStore {
    async fn transact(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
        update: AggregationUpdate<'_>,
    ) -> Result<UsageAggregation, MeteringError> {
        let key = AggregationKey::new(bucket, period);
        let empty = UsageAggregation::empty(bucket.clone(), period.clone());
        let empty_payload = serde_json::to_value(&empty)
            .map_err(|e| MeteringError::internal(format!("Failed to serialize document: {}", e)))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to begin transaction: {}", e)))?;

        // Make sure the row exists before locking it; concurrent inserts
        // collapse onto one row and then serialize on the lock below.
        sqlx::query(
            r#"
            INSERT INTO usage_aggregation (key, payload, version)
            VALUES ($1, $2, 0)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(&empty_payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| MeteringError::storage(format!("Failed to seed aggregation row: {}", e)))?;

        let row = sqlx::query(
            "SELECT payload FROM usage_aggregation WHERE key = $1 FOR UPDATE",
        )
        .bind(key.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| MeteringError::storage(format!("Failed to lock aggregation row: {}", e)))?;

        let payload: serde_json::Value = row
            .try_get("payload")
            .map_err(|e| MeteringError::storage(format!("Missing payload column: {}", e)))?;
        let mut document: UsageAggregation = serde_json::from_value(payload)
            .map_err(|e| MeteringError::internal(format!("Failed to deserialize document: {}", e)))?;

        update(&mut document);
        document.version += 1;

        let updated_payload = serde_json::to_value(&document)
            .map_err(|e| MeteringError::internal(format!("Failed to serialize document: {}", e)))?;

        sqlx::query("UPDATE usage_aggregation SET payload = $2, version = version + 1 WHERE key = $1")
            .bind(key.as_str())
            .bind(updated_payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to update aggregation: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to commit transaction: {}", e)))?;

        Ok(document)
    }

    async fn get(&self, key: &AggregationKey) -> Result<Option<UsageAggregation>, MeteringError> {
        let row = sqlx::query("SELECT payload FROM usage_aggregation WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to get aggregation: {}", e)))?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row
                    .try_get("payload")
                    .map_err(|e| MeteringError::storage(format!("Missing payload column: {}", e)))?;
                let document = serde_json::from_value(payload).map_err(|e| {
                    MeteringError::internal(format!("Failed to deserialize document: {}", e))
                })?;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<UsageAggregation>, MeteringError> {
        let rows = sqlx::query("SELECT payload FROM usage_aggregation")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to list aggregations: {}", e)))?;

        rows.iter()
            .map(|row| {
                let payload: serde_json::Value = row
                    .try_get("payload")
                    .map_err(|e| MeteringError::storage(format!("Missing payload column: {}", e)))?;
                serde_json::from_value(payload).map_err(|e| {
                    MeteringError::internal(format!("Failed to deserialize document: {}", e))
                })
            })
            .collect()
    }
}
