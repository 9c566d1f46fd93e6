//! Full-call tracking: admission, execution, recording, notifications

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::directory::UserId;
use crate::domain::institution::Institution;
use crate::domain::license::{DenyReason, LicenseStatus, QuotaDecision};
use crate::domain::storage::Storage;
use crate::domain::usage::{
    CallContext, CallPerformance, CallStatus, CallType, PeriodKey, ResourceUnits, TokenUsage,
    UsageAggregation, UsageDraft, UsageLogEntry,
};
use crate::domain::MeteringError;
use crate::infrastructure::admission::AdmissionController;
use crate::infrastructure::notification::NotificationService;
use crate::infrastructure::policy::{EffectiveLicense, LicenseResolver};

use super::recorder::UsageRecorder;

/// Result of one tracked AI call
#[derive(Debug, Clone)]
pub struct TrackedCall {
    pub response: Value,
    pub decision: QuotaDecision,
    /// Recorded entry, absent when best-effort recording failed
    pub usage: Option<UsageLogEntry>,
}

/// Wraps a provider call with the complete metering lifecycle
///
/// Admission runs before the wrapped future, so a denied call never reaches
/// the provider. Everything after a successful provider call is best-effort:
/// the response is returned even when recording or notification fails.
#[derive(Debug)]
pub struct AiCallTracker {
    resolver: Arc<LicenseResolver>,
    admission: Arc<AdmissionController>,
    recorder: Arc<UsageRecorder>,
    institutions: Arc<dyn Storage<Institution>>,
    notifications: Arc<NotificationService>,
}

impl AiCallTracker {
    pub fn new(
        resolver: Arc<LicenseResolver>,
        admission: Arc<AdmissionController>,
        recorder: Arc<UsageRecorder>,
        institutions: Arc<dyn Storage<Institution>>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            resolver,
            admission,
            recorder,
            institutions,
            notifications,
        }
    }

    pub async fn track_ai_call<F, Fut>(
        &self,
        user_id: &UserId,
        call_type: CallType,
        provider: &str,
        model: &str,
        context: CallContext,
        execute: F,
    ) -> Result<TrackedCall, MeteringError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, MeteringError>>,
    {
        let effective = self.resolver.resolve(user_id).await?;
        let decision = self
            .admission
            .decide(&effective.bucket, &effective.license, call_type)
            .await?;

        if !decision.allowed {
            return Err(denial_error(&effective.license.status, decision));
        }

        let started = Instant::now();
        let result = execute().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                // The provider was reached, so the failed call is still
                // accounted for, with zero billable units.
                let draft = UsageDraft::new(
                    effective.bucket.clone(),
                    user_id.clone(),
                    effective.identity.role,
                    call_type,
                    provider,
                    model,
                )
                .with_context(context)
                .with_performance(CallPerformance {
                    latency_ms,
                    cache_hit: false,
                    retry_count: 0,
                })
                .with_status(CallStatus::Error);

                self.recorder.log_usage_best_effort(draft).await;

                return Err(e);
            }
        };

        let units = billable_units(call_type, &response);
        let draft = UsageDraft::new(
            effective.bucket.clone(),
            user_id.clone(),
            effective.identity.role,
            call_type,
            provider,
            model,
        )
        .with_units(units)
        .with_context(context)
        .with_performance(CallPerformance {
            latency_ms,
            cache_hit: false,
            retry_count: 0,
        });

        let recorded = self.recorder.log_usage_best_effort(draft).await;

        let usage = match recorded {
            Some(recorded) => {
                self.evaluate_thresholds(&effective, &recorded.aggregation, call_type)
                    .await;

                Some(recorded.entry)
            }
            None => None,
        };

        self.touch_institution(&effective).await;

        Ok(TrackedCall {
            response,
            decision,
            usage,
        })
    }

    async fn evaluate_thresholds(
        &self,
        effective: &EffectiveLicense,
        aggregation: &UsageAggregation,
        call_type: CallType,
    ) {
        let dimension = call_type.dimension();
        let limit = effective.license.quotas.limit(dimension);
        let percent = limit.percent_used(aggregation.totals.used(dimension));
        let period = PeriodKey::current();

        if let Err(e) = self
            .notifications
            .evaluate_quota_thresholds(&effective.bucket, &period, percent)
            .await
        {
            warn!(error = %e, "Failed to evaluate quota notifications");
        }
    }

    async fn touch_institution(&self, effective: &EffectiveLicense) {
        let Some(institution_id) = effective.bucket.institution_id() else {
            return;
        };

        let result = async {
            let Some(mut institution) = self.institutions.get(institution_id).await? else {
                return Ok::<_, MeteringError>(());
            };

            institution.touch_activity(Utc::now());
            self.institutions.update(institution).await?;

            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(
                institution_id = %institution_id.as_str(),
                error = %e,
                "Failed to bump institution activity marker"
            );
        } else {
            debug!(institution_id = %institution_id.as_str(), "Institution activity bumped");
        }
    }
}

/// Map a denial decision onto the typed error surface
fn denial_error(status: &LicenseStatus, decision: QuotaDecision) -> MeteringError {
    match decision.reason {
        Some(DenyReason::LicenseExpired) if *status == LicenseStatus::Suspended => {
            MeteringError::license_suspended("License is suspended")
        }
        Some(DenyReason::LicenseExpired) => MeteringError::license_expired("License has expired"),
        Some(DenyReason::FeatureDisabled) => MeteringError::feature_disabled(format!(
            "The '{}' capability is not part of this license",
            decision.dimension
        )),
        Some(DenyReason::QuotaExceeded) | None => MeteringError::quota_exceeded(
            format!(
                "Monthly {} quota exhausted ({} used)",
                decision.dimension, decision.current_usage
            ),
            decision,
        ),
    }
}

/// Billable units for a call, from the provider response shape
fn billable_units(call_type: CallType, response: &Value) -> ResourceUnits {
    let tokens = TokenUsage::from_response(response);

    match call_type {
        CallType::ImageGeneration => ResourceUnits::tokens(tokens).with_images(1),
        CallType::AudioNarration => {
            let seconds = response
                .get("duration_seconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);

            ResourceUnits::tokens(tokens).with_audio_seconds(seconds)
        }
        CallType::PodcastGeneration => ResourceUnits::tokens(tokens).with_podcasts(1),
        _ => ResourceUnits::tokens(tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{UserIdentity, UserRole};
    use crate::domain::license::{License, LicenseTier};
    use crate::domain::notification::Notification;
    use crate::domain::usage::{AtomicCounterStore, TenantBucket, UsageAggregation};
    use crate::infrastructure::directory::StaticDirectory;
    use crate::infrastructure::storage::InMemoryStorage;
    use crate::infrastructure::usage::{InMemoryAggregationStore, InMemoryUsageLogRepository};
    use serde_json::json;

    struct Fixture {
        tracker: AiCallTracker,
        counters: Arc<InMemoryAggregationStore>,
        notifications: Arc<InMemoryStorage<Notification>>,
        institutions: Arc<dyn Storage<Institution>>,
    }

    fn fixture(license: License) -> Fixture {
        let directory = Arc::new(StaticDirectory::with_identities(vec![
            UserIdentity::new("teacher-1", UserRole::Teacher).with_institution("inst-1"),
        ]));
        let institutions: Arc<dyn Storage<Institution>> =
            Arc::new(InMemoryStorage::with_entities(vec![
                Institution::new("inst-1", "Springfield High").with_license("lic-1"),
            ]));
        let licenses = Arc::new(InMemoryStorage::with_entities(vec![license]));
        let counters = Arc::new(InMemoryAggregationStore::new());
        let log = Arc::new(InMemoryUsageLogRepository::new());
        let notification_store = Arc::new(InMemoryStorage::new());

        let resolver = Arc::new(LicenseResolver::new(
            directory,
            institutions.clone(),
            licenses,
        ));
        let admission = Arc::new(AdmissionController::new(resolver.clone(), counters.clone()));
        let recorder = Arc::new(UsageRecorder::new(log, counters.clone()));
        let notifications = Arc::new(NotificationService::new(notification_store.clone()));

        Fixture {
            tracker: AiCallTracker::new(
                resolver,
                admission,
                recorder,
                institutions.clone(),
                notifications,
            ),
            counters,
            notifications: notification_store,
            institutions,
        }
    }

    fn openai_response(prompt: u64, completion: u64) -> Value {
        json!({
            "choices": [],
            "usage": { "prompt_tokens": prompt, "completion_tokens": completion }
        })
    }

    #[tokio::test]
    async fn test_tracked_call_records_usage_and_activity() {
        let fixture = fixture(License::new("lic-1", LicenseTier::Pro).with_institution("inst-1"));

        let tracked = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::LessonContent,
                "openai",
                "gpt-4o-mini",
                CallContext::new().with_course("course-7"),
                || async { Ok(openai_response(1_000, 1_000)) },
            )
            .await
            .unwrap();

        let usage = tracked.usage.unwrap();
        assert_eq!(usage.units.tokens.total(), 2_000);
        assert_eq!(usage.cost_micros, 750);

        let bucket = TenantBucket::Institution("inst-1".into());
        let key = crate::domain::usage::AggregationKey::new(&bucket, &PeriodKey::current());
        let aggregation = fixture.counters.get(&key).await.unwrap().unwrap();
        assert_eq!(aggregation.totals.text_tokens, 2_000);

        let institution = fixture
            .institutions
            .get(&"inst-1".into())
            .await
            .unwrap()
            .unwrap();
        assert!(institution.last_activity_at.is_some());
    }

    #[tokio::test]
    async fn test_denied_call_never_executes() {
        let mut license = License::new("lic-1", LicenseTier::Free).with_institution("inst-1");
        license.expire();
        let fixture = fixture(license);

        let executed = std::sync::atomic::AtomicBool::new(false);

        let err = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::LessonSkeleton,
                "openai",
                "gpt-4o-mini",
                CallContext::new(),
                || {
                    executed.store(true, std::sync::atomic::Ordering::SeqCst);
                    async { Ok(json!({})) }
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MeteringError::LicenseExpired { .. }));
        assert!(!executed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_suspended_license_maps_to_suspended_error() {
        let mut license = License::new("lic-1", LicenseTier::Pro).with_institution("inst-1");
        license.suspend();
        let fixture = fixture(license);

        let err = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::LessonSkeleton,
                "openai",
                "gpt-4o-mini",
                CallContext::new(),
                || async { Ok(json!({})) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MeteringError::LicenseSuspended { .. }));
    }

    #[tokio::test]
    async fn test_quota_denial_carries_decision() {
        let fixture = fixture(License::new("lic-1", LicenseTier::Free).with_institution("inst-1"));
        let bucket = TenantBucket::Institution("inst-1".into());
        let update = |document: &mut UsageAggregation| {
            document.totals.total_calls += 1;
            document.totals.text_tokens += 50_000;
        };
        fixture
            .counters
            .transact(&bucket, &PeriodKey::current(), &update)
            .await
            .unwrap();

        let err = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::LessonSkeleton,
                "openai",
                "gpt-4o-mini",
                CallContext::new(),
                || async { Ok(json!({})) },
            )
            .await
            .unwrap_err();

        match err {
            MeteringError::QuotaExceeded { decision, .. } => {
                assert_eq!(decision.current_usage, 50_000);
                assert!(decision.can_upgrade);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_error_is_recorded_and_propagated() {
        let fixture = fixture(License::new("lic-1", LicenseTier::Pro).with_institution("inst-1"));

        let err = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::ChatAssist,
                "openai",
                "gpt-4o-mini",
                CallContext::new(),
                || async { Err(MeteringError::internal("provider unreachable")) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MeteringError::Internal { .. }));

        let bucket = TenantBucket::Institution("inst-1".into());
        let key = crate::domain::usage::AggregationKey::new(&bucket, &PeriodKey::current());
        let aggregation = fixture.counters.get(&key).await.unwrap().unwrap();
        // The failed call is counted but bills nothing
        assert_eq!(aggregation.totals.total_calls, 1);
        assert_eq!(aggregation.totals.text_tokens, 0);
        assert_eq!(aggregation.totals.cost_micros, 0);
    }

    #[tokio::test]
    async fn test_critical_threshold_fires_once() {
        let fixture = fixture(License::new("lic-1", LicenseTier::Free).with_institution("inst-1"));
        let bucket = TenantBucket::Institution("inst-1".into());
        let update = |document: &mut UsageAggregation| {
            document.totals.total_calls += 1;
            document.totals.text_tokens += 49_000;
        };
        fixture
            .counters
            .transact(&bucket, &PeriodKey::current(), &update)
            .await
            .unwrap();

        let tracked = fixture
            .tracker
            .track_ai_call(
                &UserId::new("teacher-1"),
                CallType::LessonSkeleton,
                "openai",
                "gpt-4o-mini",
                CallContext::new(),
                || async { Ok(openai_response(300, 200)) },
            )
            .await
            .unwrap();

        // Admitted at 98% of the 50k free-tier limit
        assert!(tracked.decision.allowed);
        assert!((tracked.decision.percent_used - 98.0).abs() < f64::EPSILON);

        let kinds: Vec<_> = fixture
            .notifications
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&crate::domain::notification::NotificationKind::QuotaWarning));
        assert!(kinds.contains(&crate::domain::notification::NotificationKind::QuotaCritical));
    }
}
