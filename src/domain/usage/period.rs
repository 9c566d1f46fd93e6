//! Billing period and partition keys

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::UserId;
use crate::domain::institution::InstitutionId;
use crate::domain::storage::StorageKey;

/// First instant of the month following `now`
pub fn first_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .earliest()
        .unwrap_or(now)
}

/// Monthly billing period, rendered as `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey(String);

impl PeriodKey {
    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accounting bucket a usage event is charged to: the institution when the
/// user belongs to one, otherwise the user's personal free-tier bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TenantBucket {
    Institution(InstitutionId),
    Personal(UserId),
}

impl TenantBucket {
    pub fn slug(&self) -> String {
        match self {
            Self::Institution(id) => format!("inst-{}", id.as_str()),
            Self::Personal(id) => format!("user-{}", id.as_str()),
        }
    }

    pub fn institution_id(&self) -> Option<&InstitutionId> {
        match self {
            Self::Institution(id) => Some(id),
            Self::Personal(_) => None,
        }
    }
}

impl std::fmt::Display for TenantBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// Partition key of one aggregation document: `{tenant}_{YYYY-MM}_monthly`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationKey(String);

impl AggregationKey {
    pub fn new(bucket: &TenantBucket, period: &PeriodKey) -> Self {
        Self(format!("{}_{}_monthly", bucket.slug(), period))
    }
}

impl std::fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for AggregationKey {
    fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_key_format() {
        let at = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        assert_eq!(PeriodKey::from_datetime(at).as_str(), "2026-08");
    }

    #[test]
    fn test_first_of_next_month() {
        let mid_month = Utc.with_ymd_and_hms(2026, 8, 28, 12, 30, 0).unwrap();
        assert_eq!(
            first_of_next_month(mid_month),
            Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()
        );

        let december = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(
            first_of_next_month(december),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_aggregation_key_layout() {
        let bucket = TenantBucket::Institution(InstitutionId::new("acme"));
        let period = PeriodKey::from_datetime(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());

        let key = AggregationKey::new(&bucket, &period);

        assert_eq!(key.as_str(), "inst-acme_2026-02_monthly");
    }

    #[test]
    fn test_personal_bucket_slug() {
        let bucket = TenantBucket::Personal(UserId::new("u-9"));
        assert_eq!(bucket.slug(), "user-u-9");
        assert!(bucket.institution_id().is_none());
    }
}
