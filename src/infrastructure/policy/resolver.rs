//! License resolution: user id to the license that governs their calls

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::directory::{DirectoryLookup, UserId, UserIdentity};
use crate::domain::institution::Institution;
use crate::domain::license::{License, LicenseTier};
use crate::domain::storage::Storage;
use crate::domain::usage::TenantBucket;
use crate::domain::MeteringError;

/// The license that applies to one call, together with the metering bucket
/// it charges into
#[derive(Debug, Clone)]
pub struct EffectiveLicense {
    pub bucket: TenantBucket,
    pub license: License,
    pub identity: UserIdentity,
}

/// Resolves users to their governing license
///
/// Institution members are metered against the institution's license.
/// Personal accounts, and members of institutions with no license on file,
/// fall back to a virtual free-tier license charged to a personal bucket.
#[derive(Debug)]
pub struct LicenseResolver {
    directory: Arc<dyn DirectoryLookup>,
    institutions: Arc<dyn Storage<Institution>>,
    licenses: Arc<dyn Storage<License>>,
}

impl LicenseResolver {
    pub fn new(
        directory: Arc<dyn DirectoryLookup>,
        institutions: Arc<dyn Storage<Institution>>,
        licenses: Arc<dyn Storage<License>>,
    ) -> Self {
        Self {
            directory,
            institutions,
            licenses,
        }
    }

    pub async fn resolve(&self, user_id: &UserId) -> Result<EffectiveLicense, MeteringError> {
        let identity = self
            .directory
            .identity(user_id)
            .await?
            .ok_or_else(|| {
                MeteringError::authentication_required(format!("Unknown user '{}'", user_id))
            })?;

        let Some(institution_id) = identity.institution_id.clone() else {
            debug!(user_id = %user_id, "Personal account, using virtual free-tier license");

            return Ok(Self::personal_fallback(identity));
        };

        let Some(institution) = self.institutions.get(&institution_id).await? else {
            warn!(
                user_id = %user_id,
                institution_id = %institution_id.as_str(),
                "Directory references an unknown institution, falling back to personal license"
            );

            return Ok(Self::personal_fallback(identity));
        };

        let Some(license_id) = institution.license_id.clone() else {
            warn!(
                institution_id = %institution.id().as_str(),
                "Institution has no license on file, falling back to personal license"
            );

            return Ok(Self::personal_fallback(identity));
        };

        let Some(license) = self.licenses.get(&license_id).await? else {
            warn!(
                institution_id = %institution.id().as_str(),
                license_id = %license_id.as_str(),
                "Institution references a missing license, falling back to personal license"
            );

            return Ok(Self::personal_fallback(identity));
        };

        Ok(EffectiveLicense {
            bucket: TenantBucket::Institution(institution.id().clone()),
            license,
            identity,
        })
    }

    /// Virtual license for accounts outside any licensed institution. Never
    /// persisted; rebuilt on every resolution so its counters stay empty and
    /// admission reads usage from the aggregation store alone.
    fn personal_fallback(identity: UserIdentity) -> EffectiveLicense {
        let user_id = identity.user_id.clone();
        let license = License::new(
            format!("personal-{}", user_id.as_str()),
            LicenseTier::Free,
        );

        EffectiveLicense {
            bucket: TenantBucket::Personal(user_id),
            license,
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directory::UserRole;
    use crate::domain::license::LicenseStatus;
    use crate::infrastructure::directory::StaticDirectory;
    use crate::infrastructure::storage::InMemoryStorage;

    fn resolver_with(
        identities: Vec<UserIdentity>,
        institutions: Vec<Institution>,
        licenses: Vec<License>,
    ) -> LicenseResolver {
        LicenseResolver::new(
            Arc::new(StaticDirectory::with_identities(identities)),
            Arc::new(InMemoryStorage::with_entities(institutions)),
            Arc::new(InMemoryStorage::with_entities(licenses)),
        )
    }

    #[tokio::test]
    async fn test_resolves_institution_license() {
        let resolver = resolver_with(
            vec![UserIdentity::new("teacher-1", UserRole::Teacher).with_institution("inst-1")],
            vec![Institution::new("inst-1", "Springfield High").with_license("lic-1")],
            vec![License::new("lic-1", LicenseTier::Pro)],
        );

        let effective = resolver.resolve(&UserId::new("teacher-1")).await.unwrap();

        assert_eq!(effective.license.tier, LicenseTier::Pro);
        assert!(matches!(effective.bucket, TenantBucket::Institution(_)));
    }

    #[tokio::test]
    async fn test_personal_account_gets_free_tier() {
        let resolver = resolver_with(
            vec![UserIdentity::new("solo-1", UserRole::Teacher)],
            vec![],
            vec![],
        );

        let effective = resolver.resolve(&UserId::new("solo-1")).await.unwrap();

        assert_eq!(effective.license.tier, LicenseTier::Free);
        assert_eq!(effective.license.status, LicenseStatus::Active);
        assert!(matches!(effective.bucket, TenantBucket::Personal(_)));
    }

    #[tokio::test]
    async fn test_missing_license_falls_back_to_personal() {
        let resolver = resolver_with(
            vec![UserIdentity::new("teacher-1", UserRole::Teacher).with_institution("inst-1")],
            vec![Institution::new("inst-1", "Springfield High").with_license("lic-gone")],
            vec![],
        );

        let effective = resolver.resolve(&UserId::new("teacher-1")).await.unwrap();

        assert_eq!(effective.license.tier, LicenseTier::Free);
        assert!(matches!(effective.bucket, TenantBucket::Personal(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let resolver = resolver_with(vec![], vec![], vec![]);

        let err = resolver.resolve(&UserId::new("ghost")).await.unwrap_err();

        assert!(matches!(err, MeteringError::AuthenticationRequired { .. }));
    }
}
