//! Admission decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{Limit, QuotaDimension};

/// Machine-readable reason for denying admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    LicenseExpired,
    FeatureDisabled,
    QuotaExceeded,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LicenseExpired => write!(f, "license_expired"),
            Self::FeatureDisabled => write!(f, "feature_disabled"),
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
        }
    }
}

/// Outcome of the pre-flight quota check
///
/// Always carries the numbers a caller needs to render usage bars and an
/// upgrade prompt, whether the call was allowed or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    pub dimension: QuotaDimension,
    /// Current-period usage in the checked dimension
    pub current_usage: u64,
    pub limit: Limit,
    pub percent_used: f64,
    /// Whether a higher tier is available to the tenant
    pub can_upgrade: bool,
    /// Start of the next billing period
    pub reset_date: DateTime<Utc>,
}

impl QuotaDecision {
    pub fn allow(
        dimension: QuotaDimension,
        current_usage: u64,
        limit: Limit,
        can_upgrade: bool,
        reset_date: DateTime<Utc>,
    ) -> Self {
        Self {
            allowed: true,
            reason: None,
            dimension,
            current_usage,
            limit,
            percent_used: limit.percent_used(current_usage),
            can_upgrade,
            reset_date,
        }
    }

    pub fn deny(
        reason: DenyReason,
        dimension: QuotaDimension,
        current_usage: u64,
        limit: Limit,
        can_upgrade: bool,
        reset_date: DateTime<Utc>,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            dimension,
            current_usage,
            limit,
            percent_used: limit.percent_used(current_usage),
            can_upgrade,
            reset_date,
        }
    }
}
