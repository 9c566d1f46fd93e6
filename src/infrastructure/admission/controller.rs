//! Pre-flight quota admission

use std::sync::Arc;

use tracing::debug;

use crate::domain::directory::UserId;
use crate::domain::license::{DenyReason, License, LicenseStatus, Limit, QuotaDecision};
use crate::domain::usage::{
    AggregationKey, AtomicCounterStore, CallType, PeriodKey, TenantBucket,
};
use crate::domain::MeteringError;
use crate::infrastructure::policy::LicenseResolver;

/// Decides whether a call may proceed against the tenant's current usage
///
/// Reads the aggregation store only; the denormalized counters on the
/// license are reporting state and never feed admission. The check is a
/// plain read, not a reservation: a small overshoot under concurrency is
/// accepted and caught on the next check.
#[derive(Debug)]
pub struct AdmissionController {
    resolver: Arc<LicenseResolver>,
    counters: Arc<dyn AtomicCounterStore>,
}

impl AdmissionController {
    pub fn new(resolver: Arc<LicenseResolver>, counters: Arc<dyn AtomicCounterStore>) -> Self {
        Self {
            resolver,
            counters,
        }
    }

    /// Check one prospective call. `estimated_usage` is advisory; the
    /// decision is made on recorded usage so repeated checks are stable.
    pub async fn check_quota(
        &self,
        user_id: &UserId,
        call_type: CallType,
        estimated_usage: Option<u64>,
    ) -> Result<QuotaDecision, MeteringError> {
        let effective = self.resolver.resolve(user_id).await?;

        if let Some(estimate) = estimated_usage {
            debug!(
                user_id = %user_id,
                call_type = %call_type,
                estimate,
                "Quota check with caller-provided estimate"
            );
        }

        self.decide(&effective.bucket, &effective.license, call_type)
            .await
    }

    /// Decision against an already resolved license
    pub async fn decide(
        &self,
        bucket: &TenantBucket,
        license: &License,
        call_type: CallType,
    ) -> Result<QuotaDecision, MeteringError> {
        let dimension = call_type.dimension();
        let limit = license.quotas.limit(dimension);
        let reset_date = license.next_reset_at;

        // Suspended and expired licenses deny every call. A suspension is an
        // administrative hold, so no upgrade prompt is shown for it.
        match license.status {
            LicenseStatus::Expired => {
                return Ok(QuotaDecision::deny(
                    DenyReason::LicenseExpired,
                    dimension,
                    0,
                    limit,
                    license.can_upgrade(),
                    reset_date,
                ));
            }
            LicenseStatus::Suspended => {
                return Ok(QuotaDecision::deny(
                    DenyReason::LicenseExpired,
                    dimension,
                    0,
                    limit,
                    false,
                    reset_date,
                ));
            }
            LicenseStatus::Active | LicenseStatus::GracePeriod => {}
        }

        if !license.has_capability(call_type.required_capability()) {
            return Ok(QuotaDecision::deny(
                DenyReason::FeatureDisabled,
                dimension,
                0,
                limit,
                license.can_upgrade(),
                reset_date,
            ));
        }

        let period = PeriodKey::current();
        let key = AggregationKey::new(bucket, &period);
        let used = self
            .counters
            .get(&key)
            .await?
            .map(|document| document.totals.used(dimension))
            .unwrap_or(0);

        let bounded = match limit {
            Limit::Unlimited => {
                return Ok(QuotaDecision::allow(
                    dimension,
                    used,
                    limit,
                    license.can_upgrade(),
                    reset_date,
                ));
            }
            Limit::Bounded(value) => value,
        };

        if used < bounded {
            return Ok(QuotaDecision::allow(
                dimension,
                used,
                limit,
                license.can_upgrade(),
                reset_date,
            ));
        }

        if license.overage.allow_overage && used < license.overage.overage_ceiling(bounded) {
            debug!(
                bucket = %bucket,
                dimension = %dimension,
                used,
                bounded,
                "Allowing call in billed overage window"
            );

            return Ok(QuotaDecision::allow(
                dimension,
                used,
                limit,
                license.can_upgrade(),
                reset_date,
            ));
        }

        Ok(QuotaDecision::deny(
            DenyReason::QuotaExceeded,
            dimension,
            used,
            limit,
            license.can_upgrade(),
            reset_date,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{UserIdentity, UserRole};
    use crate::domain::institution::Institution;
    use crate::domain::license::{LicenseTier, QuotaDimension};
    use crate::domain::usage::UsageAggregation;
    use crate::infrastructure::directory::StaticDirectory;
    use crate::infrastructure::storage::InMemoryStorage;
    use crate::infrastructure::usage::InMemoryAggregationStore;

    fn controller(
        licenses: Vec<License>,
        counters: Arc<InMemoryAggregationStore>,
    ) -> AdmissionController {
        let resolver = LicenseResolver::new(
            Arc::new(StaticDirectory::with_identities(vec![
                UserIdentity::new("teacher-1", UserRole::Teacher).with_institution("inst-1"),
            ])),
            Arc::new(InMemoryStorage::with_entities(vec![
                Institution::new("inst-1", "Springfield High").with_license("lic-1"),
            ])),
            Arc::new(InMemoryStorage::with_entities(licenses)),
        );

        AdmissionController::new(Arc::new(resolver), counters)
    }

    async fn record_tokens(counters: &InMemoryAggregationStore, bucket: &TenantBucket, tokens: u64) {
        let period = PeriodKey::current();
        let update = move |document: &mut UsageAggregation| {
            document.totals.total_calls += 1;
            document.totals.text_tokens += tokens;
        };

        counters.transact(bucket, &period, &update).await.unwrap();
    }

    #[tokio::test]
    async fn test_allows_under_limit_with_percent() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let bucket = TenantBucket::Institution("inst-1".into());
        record_tokens(&counters, &bucket, 49_000).await;

        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Free).with_institution("inst-1")],
            counters,
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::LessonSkeleton, None)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.current_usage, 49_000);
        assert!((decision.percent_used - 98.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_denies_at_hard_limit() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let bucket = TenantBucket::Institution("inst-1".into());
        record_tokens(&counters, &bucket, 50_000).await;

        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Free).with_institution("inst-1")],
            counters,
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::LessonSkeleton, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::QuotaExceeded));
        assert!(decision.can_upgrade);
    }

    #[tokio::test]
    async fn test_overage_window_allows_then_closes() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let bucket = TenantBucket::Institution("inst-1".into());
        // Basic allows 10% token overage over the 500k limit
        record_tokens(&counters, &bucket, 520_000).await;

        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Basic).with_institution("inst-1")],
            counters.clone(),
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::LessonContent, None)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert!(decision.percent_used > 100.0);

        record_tokens(&counters, &bucket, 30_000).await;

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::LessonContent, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_missing_capability_is_feature_disabled() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Free).with_institution("inst-1")],
            counters,
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::ExamGeneration, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::FeatureDisabled));
    }

    #[tokio::test]
    async fn test_suspended_license_denies_without_upgrade_prompt() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let mut license = License::new("lic-1", LicenseTier::Pro).with_institution("inst-1");
        license.suspend();

        let controller = controller(vec![license], counters);

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::LessonSkeleton, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::LicenseExpired));
        assert!(!decision.can_upgrade);
    }

    #[tokio::test]
    async fn test_unlimited_tier_always_allows() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let bucket = TenantBucket::Institution("inst-1".into());
        record_tokens(&counters, &bucket, 10_000_000).await;

        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Enterprise).with_institution("inst-1")],
            counters,
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::PodcastGeneration, None)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.limit, Limit::Unlimited);
        assert_eq!(decision.percent_used, 0.0);
    }

    #[tokio::test]
    async fn test_zero_limit_denies_first_call() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        // Free tier has a zero podcast quota but carries no podcast capability
        // either, so exercise the zero-limit path with an explicit override.
        let license = License::new("lic-1", LicenseTier::Pro)
            .with_institution("inst-1")
            .with_quota(QuotaDimension::PodcastGenerations, Limit::Bounded(0));

        let controller = controller(vec![license], counters);

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::PodcastGeneration, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::QuotaExceeded));
        assert!((decision.percent_used - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_audio_usage_checked_in_minutes() {
        let counters = Arc::new(InMemoryAggregationStore::new());
        let bucket = TenantBucket::Institution("inst-1".into());
        let period = PeriodKey::current();
        // 30 minutes recorded as seconds, exactly the free-tier audio limit
        let update = |document: &mut UsageAggregation| {
            document.totals.total_calls += 1;
            document.totals.audio_seconds += 1_800;
        };
        counters.transact(&bucket, &period, &update).await.unwrap();

        let controller = controller(
            vec![License::new("lic-1", LicenseTier::Free)
                .with_institution("inst-1")
                .with_capability(crate::domain::license::Capability::AudioNarration)],
            counters,
        );

        let decision = controller
            .check_quota(&UserId::new("teacher-1"), CallType::AudioNarration, None)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.current_usage, 30);
    }
}
