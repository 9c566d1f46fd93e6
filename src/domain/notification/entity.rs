//! Deduplicated quota and lifecycle notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::usage::{PeriodKey, TenantBucket};

/// Deterministic notification key: `{tenant}_{type}_{YYYY-MM}`
///
/// Identical alert conditions within one period map to the same id, which
/// makes re-creation an idempotent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn deterministic(bucket: &TenantBucket, kind: NotificationKind, period: &PeriodKey) -> Self {
        Self(format!("{}_{}_{}", bucket.slug(), kind, period))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for NotificationId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Alert type; doubles as the dedup discriminator in the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Soft limit, >= 80% of quota
    QuotaWarning,
    /// Soft limit, >= 95% of quota
    QuotaCritical,
    /// License end date within the lookahead window
    LicenseExpiring,
    /// License past its end date, grace period entered
    LicenseExpired,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaWarning => write!(f, "quota_warning"),
            Self::QuotaCritical => write!(f, "quota_critical"),
            Self::LicenseExpiring => write!(f, "license_expiring"),
            Self::LicenseExpired => write!(f, "license_expired"),
        }
    }
}

/// Informational alert record; at most one per (tenant, kind, period)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    id: NotificationId,
    pub bucket: TenantBucket,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        bucket: TenantBucket,
        kind: NotificationKind,
        period: &PeriodKey,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId::deterministic(&bucket, kind, period),
            bucket,
            kind,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &NotificationId {
        &self.id
    }
}

impl StorageEntity for Notification {
    type Key = NotificationId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
