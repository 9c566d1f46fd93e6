//! License domain - tiers, quotas, overage policy and lifecycle

mod decision;
mod entity;
mod tier;

pub use decision::{DenyReason, QuotaDecision};
pub use entity::{
    Capability, License, LicenseId, LicenseStatus, Limit, OveragePolicy, QuotaDimension, QuotaSet,
    UsageCounters,
};
pub use tier::{LicenseTier, TierDefaults};
