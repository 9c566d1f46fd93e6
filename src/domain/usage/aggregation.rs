//! Per-tenant, per-period aggregate counters

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::license::QuotaDimension;
use crate::domain::storage::StorageEntity;

use super::period::{AggregationKey, PeriodKey, TenantBucket};
use super::record::{CallType, UsageLogEntry};

/// Running totals across all calls in one period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_calls: u64,
    pub text_tokens: u64,
    pub image_generations: u64,
    pub audio_seconds: u64,
    pub podcast_generations: u64,
    pub cost_micros: i64,
}

impl UsageTotals {
    /// Consumed units in a quota dimension; audio is metered in minutes
    pub fn used(&self, dimension: QuotaDimension) -> u64 {
        match dimension {
            QuotaDimension::TextTokens => self.text_tokens,
            QuotaDimension::ImageGenerations => self.image_generations,
            QuotaDimension::AudioMinutes => self.audio_seconds / 60,
            QuotaDimension::PodcastGenerations => self.podcast_generations,
        }
    }
}

/// Per-call-type breakdown bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownTotals {
    pub calls: u64,
    pub tokens: u64,
    pub cost_micros: i64,
}

/// One mutable counter document per `(tenant, billing period)`
///
/// Exactly one document may exist per key; all increments for a key go
/// through [`super::AtomicCounterStore::transact`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAggregation {
    key: AggregationKey,
    pub bucket: TenantBucket,
    pub period: PeriodKey,
    pub totals: UsageTotals,
    pub by_call_type: HashMap<CallType, BreakdownTotals>,
    pub by_provider: HashMap<String, BreakdownTotals>,
    pub by_user: HashMap<String, BreakdownTotals>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency marker bumped on every committed update
    pub version: u64,
}

impl UsageAggregation {
    /// Empty document for a key; created lazily on the first usage event
    /// of a period.
    pub fn empty(bucket: TenantBucket, period: PeriodKey) -> Self {
        let now = Utc::now();

        Self {
            key: AggregationKey::new(&bucket, &period),
            bucket,
            period,
            totals: UsageTotals::default(),
            by_call_type: HashMap::new(),
            by_provider: HashMap::new(),
            by_user: HashMap::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    /// Fold one log entry into the counters. Runs inside the store
    /// transaction for this document.
    pub fn apply(&mut self, entry: &UsageLogEntry) {
        let tokens = entry.units.tokens.total();

        self.totals.total_calls += 1;
        self.totals.text_tokens += tokens;
        self.totals.image_generations += entry.units.images;
        self.totals.audio_seconds += entry.units.audio_seconds;
        self.totals.podcast_generations += entry.units.podcasts;
        self.totals.cost_micros += entry.cost_micros;

        let by_type = self.by_call_type.entry(entry.call_type).or_default();
        by_type.calls += 1;
        by_type.tokens += tokens;
        by_type.cost_micros += entry.cost_micros;

        let by_provider = self.by_provider.entry(entry.provider.clone()).or_default();
        by_provider.calls += 1;
        by_provider.tokens += tokens;
        by_provider.cost_micros += entry.cost_micros;

        let by_user = self
            .by_user
            .entry(entry.user_id.as_str().to_string())
            .or_default();
        by_user.calls += 1;
        by_user.tokens += tokens;
        by_user.cost_micros += entry.cost_micros;

        self.updated_at = entry.timestamp;
    }

    pub fn cost_usd(&self) -> f64 {
        self.totals.cost_micros as f64 / 1_000_000.0
    }
}

impl StorageEntity for UsageAggregation {
    type Key = AggregationKey;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::{UserId, UserRole};
    use crate::domain::usage::{ResourceUnits, TokenUsage, UsageDraft, UsageLogId};

    fn entry(user: &str, call_type: CallType, units: ResourceUnits, cost: i64) -> UsageLogEntry {
        let draft = UsageDraft::new(
            TenantBucket::Personal(UserId::new("u-1")),
            user,
            UserRole::Teacher,
            call_type,
            "openai",
            "gpt-4o-mini",
        )
        .with_units(units);

        UsageLogEntry::from_draft(UsageLogId::generate(), draft, cost, Utc::now())
    }

    #[test]
    fn test_apply_updates_totals_and_breakdowns() {
        let mut agg = UsageAggregation::empty(
            TenantBucket::Personal(UserId::new("u-1")),
            PeriodKey::current(),
        );

        agg.apply(&entry(
            "u-1",
            CallType::LessonContent,
            ResourceUnits::tokens(TokenUsage::new(100, 50)),
            300,
        ));
        agg.apply(&entry(
            "u-2",
            CallType::ImageGeneration,
            ResourceUnits::default().with_images(2),
            80_000,
        ));

        assert_eq!(agg.totals.total_calls, 2);
        assert_eq!(agg.totals.text_tokens, 150);
        assert_eq!(agg.totals.image_generations, 2);
        assert_eq!(agg.totals.cost_micros, 80_300);
        assert_eq!(agg.by_call_type.len(), 2);
        assert_eq!(agg.by_user.len(), 2);
        assert_eq!(agg.by_provider["openai"].calls, 2);
    }

    #[test]
    fn test_audio_metered_in_minutes() {
        let mut agg = UsageAggregation::empty(
            TenantBucket::Personal(UserId::new("u-1")),
            PeriodKey::current(),
        );

        agg.apply(&entry(
            "u-1",
            CallType::AudioNarration,
            ResourceUnits::default().with_audio_seconds(150),
            0,
        ));

        assert_eq!(agg.totals.audio_seconds, 150);
        assert_eq!(agg.totals.used(QuotaDimension::AudioMinutes), 2);
    }
}
