//! License entity and quota value types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::institution::InstitutionId;
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::usage::first_of_next_month;

use super::tier::LicenseTier;

/// Unique identifier for a license
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicenseId(String);

impl LicenseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LicenseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LicenseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for LicenseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for LicenseId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// License lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Suspended,
    GracePeriod,
    Expired,
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::GracePeriod => write!(f, "grace_period"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// A quota limit: either a bounded monthly amount or unlimited
///
/// Replaces the reserved max-integer sentinel so every comparison site has
/// to handle the unlimited case explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Limit {
    Bounded(u64),
    Unlimited,
}

impl Limit {
    /// Percentage of this limit consumed by `used`; unlimited is always 0
    pub fn percent_used(&self, used: u64) -> f64 {
        match self {
            Self::Unlimited => 0.0,
            Self::Bounded(0) => 100.0,
            Self::Bounded(limit) => used as f64 / *limit as f64 * 100.0,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{}", n),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// The four metered resource dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaDimension {
    TextTokens,
    ImageGenerations,
    AudioMinutes,
    PodcastGenerations,
}

impl QuotaDimension {
    pub const ALL: [QuotaDimension; 4] = [
        QuotaDimension::TextTokens,
        QuotaDimension::ImageGenerations,
        QuotaDimension::AudioMinutes,
        QuotaDimension::PodcastGenerations,
    ];
}

impl std::fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTokens => write!(f, "text_tokens"),
            Self::ImageGenerations => write!(f, "image_generations"),
            Self::AudioMinutes => write!(f, "audio_minutes"),
            Self::PodcastGenerations => write!(f, "podcast_generations"),
        }
    }
}

/// Monthly quota limits, one per dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSet {
    pub text_tokens: Limit,
    pub image_generations: Limit,
    pub audio_minutes: Limit,
    pub podcast_generations: Limit,
}

impl QuotaSet {
    pub fn unlimited() -> Self {
        Self {
            text_tokens: Limit::Unlimited,
            image_generations: Limit::Unlimited,
            audio_minutes: Limit::Unlimited,
            podcast_generations: Limit::Unlimited,
        }
    }

    pub fn limit(&self, dimension: QuotaDimension) -> Limit {
        match dimension {
            QuotaDimension::TextTokens => self.text_tokens,
            QuotaDimension::ImageGenerations => self.image_generations,
            QuotaDimension::AudioMinutes => self.audio_minutes,
            QuotaDimension::PodcastGenerations => self.podcast_generations,
        }
    }

    pub fn set_limit(&mut self, dimension: QuotaDimension, limit: Limit) {
        match dimension {
            QuotaDimension::TextTokens => self.text_tokens = limit,
            QuotaDimension::ImageGenerations => self.image_generations = limit,
            QuotaDimension::AudioMinutes => self.audio_minutes = limit,
            QuotaDimension::PodcastGenerations => self.podcast_generations = limit,
        }
    }
}

/// Denormalized per-dimension usage counters
///
/// Kept inside the license for cheap dashboard reads. The authoritative
/// per-period values live in the aggregation store; the admission check
/// never reads these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub text_tokens_used: u64,
    pub image_generations_used: u64,
    pub audio_minutes_used: u64,
    pub podcast_generations_used: u64,
}

impl UsageCounters {
    pub fn used(&self, dimension: QuotaDimension) -> u64 {
        match dimension {
            QuotaDimension::TextTokens => self.text_tokens_used,
            QuotaDimension::ImageGenerations => self.image_generations_used,
            QuotaDimension::AudioMinutes => self.audio_minutes_used,
            QuotaDimension::PodcastGenerations => self.podcast_generations_used,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Overage policy attached to a license
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OveragePolicy {
    /// Whether consumption may continue past the nominal limit
    pub allow_overage: bool,
    /// Billed rate for overage consumption, micro-dollars per 1K units
    pub overage_rate_per_1k_micros: i64,
    /// Maximum overage as a percentage of the nominal limit
    pub max_overage_percent: u8,
    /// Free-tier style cutoff; removes the overage allowance entirely
    pub hard_limit: bool,
}

impl OveragePolicy {
    pub fn hard() -> Self {
        Self {
            allow_overage: false,
            overage_rate_per_1k_micros: 0,
            max_overage_percent: 0,
            hard_limit: true,
        }
    }

    pub fn with_overage(rate_per_1k_micros: i64, max_percent: u8) -> Self {
        Self {
            allow_overage: true,
            overage_rate_per_1k_micros: rate_per_1k_micros,
            max_overage_percent: max_percent,
            hard_limit: false,
        }
    }

    /// Absolute ceiling for a bounded limit under this policy
    pub fn overage_ceiling(&self, limit: u64) -> u64 {
        if self.allow_overage && !self.hard_limit {
            limit + limit * self.max_overage_percent as u64 / 100
        } else {
            limit
        }
    }
}

/// Closed set of license capabilities
///
/// Replaces string-keyed feature-flag maps; every admission check matches
/// exhaustively on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    LessonGeneration,
    ExamGeneration,
    TocExtraction,
    ImageGeneration,
    AudioNarration,
    PodcastGeneration,
    ChatAssist,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessonGeneration => write!(f, "lesson_generation"),
            Self::ExamGeneration => write!(f, "exam_generation"),
            Self::TocExtraction => write!(f, "toc_extraction"),
            Self::ImageGeneration => write!(f, "image_generation"),
            Self::AudioNarration => write!(f, "audio_narration"),
            Self::PodcastGeneration => write!(f, "podcast_generation"),
            Self::ChatAssist => write!(f, "chat_assist"),
        }
    }
}

/// A tenant's license: tier, quotas, overage policy and lifecycle markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    id: LicenseId,
    /// Owning institution; `None` for virtual personal licenses
    pub institution_id: Option<InstitutionId>,
    pub tier: LicenseTier,
    pub status: LicenseStatus,
    pub quotas: QuotaSet,
    pub counters: UsageCounters,
    pub overage: OveragePolicy,
    pub capabilities: Vec<Capability>,
    pub last_reset_at: DateTime<Utc>,
    pub next_reset_at: DateTime<Utc>,
    /// Contractual end of the license, if any
    pub end_date: Option<DateTime<Utc>>,
    /// Set when the expiry sweep moves the license into its grace window
    pub grace_period_end: Option<DateTime<Utc>>,
}

impl License {
    /// Create a license on its tier defaults, billing window starting now
    pub fn new(id: impl Into<LicenseId>, tier: LicenseTier) -> Self {
        let now = Utc::now();
        let defaults = tier.defaults();

        Self {
            id: id.into(),
            institution_id: None,
            tier,
            status: LicenseStatus::Active,
            quotas: defaults.quotas,
            counters: UsageCounters::default(),
            overage: defaults.overage,
            capabilities: defaults.capabilities,
            last_reset_at: now,
            next_reset_at: first_of_next_month(now),
            end_date: None,
            grace_period_end: None,
        }
    }

    pub fn with_institution(mut self, institution_id: impl Into<InstitutionId>) -> Self {
        self.institution_id = Some(institution_id.into());
        self
    }

    /// Override a single quota limit; explicit values win over tier defaults
    pub fn with_quota(mut self, dimension: QuotaDimension, limit: Limit) -> Self {
        self.quotas.set_limit(dimension, limit);
        self
    }

    pub fn with_overage(mut self, overage: OveragePolicy) -> Self {
        self.overage = overage;
        self
    }

    pub fn with_end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn id(&self) -> &LicenseId {
        &self.id
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the top tier is still available as an upgrade
    pub fn can_upgrade(&self) -> bool {
        self.tier != LicenseTier::Enterprise
    }

    pub fn suspend(&mut self) {
        self.status = LicenseStatus::Suspended;
    }

    pub fn reactivate(&mut self) {
        self.status = LicenseStatus::Active;
    }

    /// Expiry sweep transition: active license past its end date
    pub fn enter_grace_period(&mut self, until: DateTime<Utc>) {
        self.status = LicenseStatus::GracePeriod;
        self.grace_period_end = Some(until);
    }

    /// Finalize after the grace window has elapsed
    pub fn expire(&mut self) {
        self.status = LicenseStatus::Expired;
    }

    /// Admin renewal from grace period or expiry back to active
    pub fn renew(&mut self, new_end_date: Option<DateTime<Utc>>) {
        self.status = LicenseStatus::Active;
        self.end_date = new_end_date;
        self.grace_period_end = None;
    }

    /// Monthly reset: zero the denormalized counters and advance the
    /// billing window. Does not change status.
    pub fn reset_counters(&mut self, now: DateTime<Utc>) {
        self.counters = UsageCounters::default();
        self.last_reset_at = now;
        self.next_reset_at = first_of_next_month(now);
    }
}

impl StorageEntity for License {
    type Key = LicenseId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_limit_percent_used() {
        assert!((Limit::Bounded(200).percent_used(98) - 49.0).abs() < f64::EPSILON);
        assert_eq!(Limit::Unlimited.percent_used(1_000_000), 0.0);
        assert_eq!(Limit::Bounded(0).percent_used(5), 100.0);
    }

    #[test]
    fn test_overage_ceiling() {
        let policy = OveragePolicy::with_overage(2000, 10);
        assert_eq!(policy.overage_ceiling(50_000), 55_000);

        let hard = OveragePolicy::hard();
        assert_eq!(hard.overage_ceiling(50_000), 50_000);
    }

    #[test]
    fn test_license_defaults_from_tier() {
        let license = License::new("lic-1", LicenseTier::Free);

        assert_eq!(license.status, LicenseStatus::Active);
        assert!(license.counters.is_zero());
        assert!(license.has_capability(Capability::LessonGeneration));
        assert!(!license.has_capability(Capability::PodcastGeneration));
        assert!(license.can_upgrade());
    }

    #[test]
    fn test_quota_override_wins_over_default() {
        let license = License::new("lic-1", LicenseTier::Free)
            .with_quota(QuotaDimension::TextTokens, Limit::Bounded(123));

        assert_eq!(
            license.quotas.limit(QuotaDimension::TextTokens),
            Limit::Bounded(123)
        );
        // Other dimensions keep tier defaults
        assert_eq!(
            license.quotas.limit(QuotaDimension::ImageGenerations),
            LicenseTier::Free.defaults().quotas.image_generations
        );
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut license = License::new("lic-1", LicenseTier::Basic);

        license.suspend();
        assert_eq!(license.status, LicenseStatus::Suspended);

        license.reactivate();
        assert_eq!(license.status, LicenseStatus::Active);

        let until = Utc::now();
        license.enter_grace_period(until);
        assert_eq!(license.status, LicenseStatus::GracePeriod);
        assert_eq!(license.grace_period_end, Some(until));

        license.expire();
        assert_eq!(license.status, LicenseStatus::Expired);

        license.renew(None);
        assert_eq!(license.status, LicenseStatus::Active);
        assert!(license.grace_period_end.is_none());
    }

    #[test]
    fn test_reset_counters_advances_window() {
        let mut license = License::new("lic-1", LicenseTier::Basic);
        license.counters.text_tokens_used = 42_000;

        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        license.reset_counters(now);

        assert!(license.counters.is_zero());
        assert_eq!(license.last_reset_at, now);
        assert_eq!(
            license.next_reset_at,
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_enterprise_cannot_upgrade() {
        let license = License::new("lic-1", LicenseTier::Enterprise);
        assert!(!license.can_upgrade());
    }
}
