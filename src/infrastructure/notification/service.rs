//! Quota and lifecycle notifications, de-duplicated per period

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::usage::{PeriodKey, TenantBucket};
use crate::domain::MeteringError;

/// Threshold at which a [`NotificationKind::QuotaWarning`] fires
pub const WARNING_THRESHOLD_PERCENT: f64 = 80.0;
/// Threshold at which a [`NotificationKind::QuotaCritical`] fires
pub const CRITICAL_THRESHOLD_PERCENT: f64 = 95.0;

/// Emits at most one notification per (tenant, kind, period)
///
/// De-duplication rides on the deterministic notification id: the store's
/// uniqueness check is the gate, so concurrent emitters race on the insert
/// and exactly one wins.
#[derive(Debug)]
pub struct NotificationService {
    store: Arc<dyn Storage<Notification>>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Storage<Notification>>) -> Self {
        Self { store }
    }

    /// Create the notification unless one with the same identity exists.
    /// Returns whether a new notification was created.
    pub async fn notify_once(
        &self,
        bucket: &TenantBucket,
        kind: NotificationKind,
        period: &PeriodKey,
        message: impl Into<String>,
    ) -> Result<bool, MeteringError> {
        let notification = Notification::new(bucket.clone(), kind, period, message);

        if self.store.exists(notification.key()).await? {
            debug!(
                bucket = %bucket,
                kind = %kind,
                "Notification already emitted this period"
            );

            return Ok(false);
        }

        match self.store.create(notification).await {
            Ok(created) => {
                info!(
                    bucket = %bucket,
                    kind = %kind,
                    notification_id = %created.id().as_str(),
                    "Notification emitted"
                );

                Ok(true)
            }
            // A concurrent emitter won the insert race
            Err(MeteringError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fire warning and critical quota alerts for the given usage ratio.
    /// Crossing 95% emits both levels, each at most once per period.
    pub async fn evaluate_quota_thresholds(
        &self,
        bucket: &TenantBucket,
        period: &PeriodKey,
        percent_used: f64,
    ) -> Result<(), MeteringError> {
        if percent_used >= WARNING_THRESHOLD_PERCENT {
            self.notify_once(
                bucket,
                NotificationKind::QuotaWarning,
                period,
                format!("Usage at {:.1}% of the monthly quota", percent_used),
            )
            .await?;
        }

        if percent_used >= CRITICAL_THRESHOLD_PERCENT {
            self.notify_once(
                bucket,
                NotificationKind::QuotaCritical,
                period,
                format!("Usage at {:.1}% of the monthly quota", percent_used),
            )
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::institution::InstitutionId;
    use crate::infrastructure::storage::InMemoryStorage;

    fn service() -> (NotificationService, Arc<InMemoryStorage<Notification>>) {
        let store = Arc::new(InMemoryStorage::new());
        (NotificationService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_notify_once_deduplicates() {
        let (service, store) = service();
        let bucket = TenantBucket::Institution(InstitutionId::new("inst-1"));
        let period = PeriodKey::current();

        let first = service
            .notify_once(&bucket, NotificationKind::QuotaWarning, &period, "80%")
            .await
            .unwrap();
        let second = service
            .notify_once(&bucket, NotificationKind::QuotaWarning, &period, "82%")
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_thresholds_below_warning_emit_nothing() {
        let (service, store) = service();
        let bucket = TenantBucket::Institution(InstitutionId::new("inst-1"));
        let period = PeriodKey::current();

        service
            .evaluate_quota_thresholds(&bucket, &period, 79.9)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_crossing_critical_emits_both_levels() {
        let (service, store) = service();
        let bucket = TenantBucket::Institution(InstitutionId::new("inst-1"));
        let period = PeriodKey::current();

        service
            .evaluate_quota_thresholds(&bucket, &period, 98.0)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        // A later evaluation in the same period adds nothing
        service
            .evaluate_quota_thresholds(&bucket, &period, 99.0)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }
}
