//! Institution (tenant) entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::license::{LicenseId, LicenseStatus};
use crate::domain::storage::{StorageEntity, StorageKey};

/// Unique identifier for an institution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstitutionId(String);

impl InstitutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstitutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstitutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for InstitutionId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// A tenant consuming metered AI resources under one license
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    id: InstitutionId,
    pub name: String,
    /// Reference to the owning license; `None` until onboarding completes
    pub license_id: Option<LicenseId>,
    /// Mirror of the license status, kept in sync by the expiry sweep
    pub license_status: LicenseStatus,
    pub teacher_count: u32,
    pub student_count: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Institution {
    pub fn new(id: impl Into<InstitutionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            license_id: None,
            license_status: LicenseStatus::Active,
            teacher_count: 0,
            student_count: 0,
            last_activity_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_license(mut self, license_id: impl Into<LicenseId>) -> Self {
        self.license_id = Some(license_id.into());
        self
    }

    pub fn with_members(mut self, teachers: u32, students: u32) -> Self {
        self.teacher_count = teachers;
        self.student_count = students;
        self
    }

    pub fn id(&self) -> &InstitutionId {
        &self.id
    }

    /// Stamp the rollup activity marker; called on every tracked AI call
    pub fn touch_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity_at = Some(at);
    }

    /// Mirror a license transition onto the tenant record
    pub fn mirror_license_status(&mut self, status: LicenseStatus) {
        self.license_status = status;
    }
}

impl StorageEntity for Institution {
    type Key = InstitutionId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_institution_creation() {
        let institution = Institution::new("inst-1", "Springfield High")
            .with_license("lic-1")
            .with_members(40, 900);

        assert_eq!(institution.id().as_str(), "inst-1");
        assert_eq!(institution.name, "Springfield High");
        assert_eq!(institution.teacher_count, 40);
        assert_eq!(institution.student_count, 900);
        assert!(institution.last_activity_at.is_none());
    }

    #[test]
    fn test_touch_activity() {
        let mut institution = Institution::new("inst-1", "Test");
        let now = Utc::now();

        institution.touch_activity(now);

        assert_eq!(institution.last_activity_at, Some(now));
    }

    #[test]
    fn test_mirror_license_status() {
        let mut institution = Institution::new("inst-1", "Test");

        institution.mirror_license_status(LicenseStatus::GracePeriod);

        assert_eq!(institution.license_status, LicenseStatus::GracePeriod);
    }
}
