//! Edu Metering
//!
//! Usage metering and quota enforcement for metered AI resources in a
//! multi-tenant education platform:
//! - Tiered licenses with per-dimension quotas and overage policies
//! - Pre-flight admission checks before each AI call
//! - Append-only usage log with transactional per-period aggregation
//! - Threshold notifications and license lifecycle jobs

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use domain::directory::{DirectoryLookup, UserId};
use domain::institution::{Institution, InstitutionId};
use domain::license::{License, QuotaDecision};
use domain::notification::Notification;
use domain::storage::Storage;
use domain::usage::{
    AtomicCounterStore, CallContext, CallType, UsageDraft, UsageLogRepository,
};
use domain::MeteringError;
use infrastructure::admission::AdmissionController;
use infrastructure::directory::StaticDirectory;
use infrastructure::metering::{
    AiCallTracker, InstitutionUsageStats, RecordedUsage, TrackedCall, UsageRecorder,
    UsageSideChannel, UsageStatsService,
};
use infrastructure::notification::NotificationService;
use infrastructure::policy::LicenseResolver;
use infrastructure::scheduler::SchedulerJobs;
use infrastructure::storage::InMemoryStorage;
use infrastructure::usage::{
    ensure_schema, InMemoryAggregationStore, InMemoryUsageLogRepository,
    PostgresAggregationStore, PostgresUsageLogRepository,
};

/// The backing stores an engine is built on
pub struct MeteringStores {
    pub directory: Arc<dyn DirectoryLookup>,
    pub institutions: Arc<dyn Storage<Institution>>,
    pub licenses: Arc<dyn Storage<License>>,
    pub notifications: Arc<dyn Storage<Notification>>,
    pub usage_log: Arc<dyn UsageLogRepository>,
    pub counters: Arc<dyn AtomicCounterStore>,
}

impl MeteringStores {
    /// Everything in memory; the default for tests and local runs
    pub fn in_memory() -> Self {
        Self {
            directory: Arc::new(StaticDirectory::new()),
            institutions: Arc::new(InMemoryStorage::new()),
            licenses: Arc::new(InMemoryStorage::new()),
            notifications: Arc::new(InMemoryStorage::new()),
            usage_log: Arc::new(InMemoryUsageLogRepository::new()),
            counters: Arc::new(InMemoryAggregationStore::new()),
        }
    }

    /// Postgres-backed usage stores; directory and entity stores stay in
    /// memory and are seeded by the embedding application.
    pub async fn postgres(url: &str, max_connections: u32) -> Result<Self, MeteringError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| MeteringError::storage(format!("Failed to connect to Postgres: {}", e)))?;

        ensure_schema(&pool).await?;

        Ok(Self {
            directory: Arc::new(StaticDirectory::new()),
            institutions: Arc::new(InMemoryStorage::new()),
            licenses: Arc::new(InMemoryStorage::new()),
            notifications: Arc::new(InMemoryStorage::new()),
            usage_log: Arc::new(PostgresUsageLogRepository::new(pool.clone())),
            counters: Arc::new(PostgresAggregationStore::new(pool)),
        })
    }
}

/// Facade wiring the resolver, admission, recording and jobs together
pub struct MeteringEngine {
    config: AppConfig,
    stores: MeteringStores,
    admission: Arc<AdmissionController>,
    recorder: Arc<UsageRecorder>,
    tracker: AiCallTracker,
    stats: UsageStatsService,
    jobs: Arc<SchedulerJobs>,
}

impl MeteringEngine {
    pub fn new(stores: MeteringStores, config: AppConfig) -> Self {
        let resolver = Arc::new(LicenseResolver::new(
            stores.directory.clone(),
            stores.institutions.clone(),
            stores.licenses.clone(),
        ));
        let admission = Arc::new(AdmissionController::new(
            resolver.clone(),
            stores.counters.clone(),
        ));
        let recorder = Arc::new(UsageRecorder::new(
            stores.usage_log.clone(),
            stores.counters.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(stores.notifications.clone()));
        let tracker = AiCallTracker::new(
            resolver.clone(),
            admission.clone(),
            recorder.clone(),
            stores.institutions.clone(),
            notifications.clone(),
        );
        let stats = UsageStatsService::new(
            stores.institutions.clone(),
            stores.licenses.clone(),
            stores.counters.clone(),
        );
        let jobs = Arc::new(SchedulerJobs::new(
            stores.licenses.clone(),
            stores.institutions.clone(),
            notifications,
            config.scheduler.clone(),
        ));

        Self {
            config,
            stores,
            admission,
            recorder,
            tracker,
            stats,
            jobs,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MeteringStores::in_memory(), AppConfig::default())
    }

    pub fn stores(&self) -> &MeteringStores {
        &self.stores
    }

    /// Pre-flight check without executing anything
    pub async fn check_quota(
        &self,
        user_id: &UserId,
        call_type: CallType,
        estimated_usage: Option<u64>,
    ) -> Result<QuotaDecision, MeteringError> {
        self.admission
            .check_quota(user_id, call_type, estimated_usage)
            .await
    }

    /// Record externally executed usage
    pub async fn log_usage(&self, draft: UsageDraft) -> Result<RecordedUsage, MeteringError> {
        self.recorder.log_usage(draft).await
    }

    /// Start the lossy background ingestion channel
    pub fn spawn_side_channel(&self) -> UsageSideChannel {
        UsageSideChannel::spawn(self.recorder.clone(), self.config.side_channel.queue_depth)
    }

    /// Run one AI call under full metering
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
        Fut: std::future::Future<Output = Result<Value, MeteringError>>,
    {
        self.tracker
            .track_ai_call(user_id, call_type, provider, model, context, execute)
            .await
    }

    pub async fn institution_usage_stats(
        &self,
        institution_id: &InstitutionId,
    ) -> Result<InstitutionUsageStats, MeteringError> {
        self.stats.institution_usage_stats(institution_id).await
    }

    pub async fn all_institutions_usage(
        &self,
    ) -> Result<Vec<InstitutionUsageStats>, MeteringError> {
        self.stats.all_institutions_usage().await
    }

    pub fn scheduler(&self) -> Arc<SchedulerJobs> {
        self.jobs.clone()
    }
}
