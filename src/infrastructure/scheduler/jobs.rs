//! Background lifecycle jobs: monthly resets and the daily expiry sweep

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::institution::Institution;
use crate::domain::license::{License, LicenseStatus};
use crate::domain::notification::NotificationKind;
use crate::domain::storage::Storage;
use crate::domain::usage::{PeriodKey, TenantBucket};
use crate::domain::MeteringError;
use crate::infrastructure::notification::NotificationService;

/// What one expiry sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expiring_soon: usize,
    pub entered_grace: usize,
    pub expired: usize,
}

/// Owns the periodic license maintenance work
///
/// Both jobs are idempotent against wall-clock re-runs: the reset keys off
/// `next_reset_at`, the sweep off status transitions, so a missed or
/// repeated tick never double-applies.
#[derive(Debug)]
pub struct SchedulerJobs {
    licenses: Arc<dyn Storage<License>>,
    institutions: Arc<dyn Storage<Institution>>,
    notifications: Arc<NotificationService>,
    config: SchedulerConfig,
}

impl SchedulerJobs {
    pub fn new(
        licenses: Arc<dyn Storage<License>>,
        institutions: Arc<dyn Storage<Institution>>,
        notifications: Arc<NotificationService>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            licenses,
            institutions,
            notifications,
            config,
        }
    }

    /// Zero the counters of every active license whose billing window has
    /// rolled over. Returns the number of licenses reset.
    pub async fn monthly_reset(&self, now: DateTime<Utc>) -> Result<usize, MeteringError> {
        let due: Vec<License> = self
            .licenses
            .list()
            .await?
            .into_iter()
            .filter(|license| {
                license.status == LicenseStatus::Active && license.next_reset_at <= now
            })
            .collect();

        if due.is_empty() {
            return Ok(0);
        }

        let mut reset_count = 0;

        for chunk in due.chunks(self.config.reset_batch_size) {
            for license in chunk {
                let mut license = license.clone();
                license.reset_counters(now);
                self.licenses.update(license).await?;
                reset_count += 1;
            }

            info!(
                reset_count,
                total = due.len(),
                "Monthly reset batch committed"
            );
        }

        Ok(reset_count)
    }

    /// Walk all licenses through the expiry lifecycle
    pub async fn expiry_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, MeteringError> {
        let mut report = SweepReport::default();
        let expiry_window = chrono::Duration::days(self.config.expiry_window_days);
        let grace_period = chrono::Duration::days(self.config.grace_period_days);
        let period = PeriodKey::from_datetime(now);

        for license in self.licenses.list().await? {
            match license.status {
                LicenseStatus::Active => {
                    let Some(end_date) = license.end_date else {
                        continue;
                    };

                    if end_date <= now {
                        let mut license = license.clone();
                        license.enter_grace_period(now + grace_period);
                        self.mirror_status(&license).await;
                        self.notify_lifecycle(
                            &license,
                            NotificationKind::LicenseExpired,
                            &period,
                            "License has expired and entered its grace period",
                        )
                        .await;
                        self.licenses.update(license).await?;
                        report.entered_grace += 1;
                    } else if end_date <= now + expiry_window {
                        self.notify_lifecycle(
                            &license,
                            NotificationKind::LicenseExpiring,
                            &period,
                            format!(
                                "License expires on {}",
                                end_date.format("%Y-%m-%d")
                            ),
                        )
                        .await;
                        report.expiring_soon += 1;
                    }
                }
                LicenseStatus::GracePeriod => {
                    let past_grace = license
                        .grace_period_end
                        .map(|until| until <= now)
                        .unwrap_or(true);

                    if past_grace {
                        let mut license = license.clone();
                        license.expire();
                        self.mirror_status(&license).await;
                        self.licenses.update(license).await?;
                        report.expired += 1;
                    }
                }
                LicenseStatus::Suspended | LicenseStatus::Expired => {}
            }
        }

        if report != SweepReport::default() {
            info!(
                expiring_soon = report.expiring_soon,
                entered_grace = report.entered_grace,
                expired = report.expired,
                "Expiry sweep applied transitions"
            );
        }

        Ok(report)
    }

    /// Periodic driver; ticks both jobs until the task is aborted
    pub async fn run(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            tick_interval_secs = self.config.tick_interval_secs,
            "Scheduler started"
        );

        loop {
            interval.tick().await;
            let now = Utc::now();

            if let Err(e) = self.monthly_reset(now).await {
                error!(error = %e, "Monthly reset failed");
            }

            if let Err(e) = self.expiry_sweep(now).await {
                error!(error = %e, "Expiry sweep failed");
            }
        }
    }

    /// Keep the institution's status column in step with its license
    async fn mirror_status(&self, license: &License) {
        let Some(institution_id) = &license.institution_id else {
            return;
        };

        let result = async {
            let Some(mut institution) = self.institutions.get(institution_id).await? else {
                return Ok::<_, MeteringError>(());
            };

            institution.mirror_license_status(license.status);
            self.institutions.update(institution).await?;

            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(
                institution_id = %institution_id.as_str(),
                error = %e,
                "Failed to mirror license status onto institution"
            );
        }
    }

    async fn notify_lifecycle(
        &self,
        license: &License,
        kind: NotificationKind,
        period: &PeriodKey,
        message: impl Into<String>,
    ) {
        let Some(institution_id) = &license.institution_id else {
            return;
        };
        let bucket = TenantBucket::Institution(institution_id.clone());

        if let Err(e) = self
            .notifications
            .notify_once(&bucket, kind, period, message)
            .await
        {
            warn!(
                institution_id = %institution_id.as_str(),
                kind = %kind,
                error = %e,
                "Failed to emit lifecycle notification"
            );
        }
    }
}
