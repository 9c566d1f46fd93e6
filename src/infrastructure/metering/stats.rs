//! Read-only usage rollups for admin views

use std::sync::Arc;

use serde::Serialize;

use crate::domain::institution::{Institution, InstitutionId};
use crate::domain::license::{License, Limit, QuotaDimension};
use crate::domain::storage::Storage;
use crate::domain::usage::{
    AggregationKey, AtomicCounterStore, PeriodKey, TenantBucket, UsageTotals,
};
use crate::domain::MeteringError;

/// One dimension's quota state in a rollup
#[derive(Debug, Clone, Serialize)]
pub struct DimensionUsage {
    pub dimension: QuotaDimension,
    pub used: u64,
    pub limit: Limit,
    pub percent_used: f64,
}

/// Current-period usage of one institution against its license
#[derive(Debug, Clone, Serialize)]
pub struct InstitutionUsageStats {
    pub institution_id: InstitutionId,
    pub name: String,
    pub period: PeriodKey,
    pub license: Option<License>,
    pub totals: UsageTotals,
    pub dimensions: Vec<DimensionUsage>,
}

/// Combines license quota state with aggregation totals
#[derive(Debug)]
pub struct UsageStatsService {
    institutions: Arc<dyn Storage<Institution>>,
    licenses: Arc<dyn Storage<License>>,
    counters: Arc<dyn AtomicCounterStore>,
}

impl UsageStatsService {
    pub fn new(
        institutions: Arc<dyn Storage<Institution>>,
        licenses: Arc<dyn Storage<License>>,
        counters: Arc<dyn AtomicCounterStore>,
    ) -> Self {
        Self {
            institutions,
            licenses,
            counters,
        }
    }

    pub async fn institution_usage_stats(
        &self,
        institution_id: &InstitutionId,
    ) -> Result<InstitutionUsageStats, MeteringError> {
        let institution = self
            .institutions
            .get(institution_id)
            .await?
            .ok_or_else(|| {
                MeteringError::not_found(format!("Institution '{}' not found", institution_id))
            })?;

        self.stats_for(&institution).await
    }

    pub async fn all_institutions_usage(
        &self,
    ) -> Result<Vec<InstitutionUsageStats>, MeteringError> {
        let institutions = self.institutions.list().await?;
        let mut stats =
            futures::future::try_join_all(institutions.iter().map(|i| self.stats_for(i))).await?;

        stats.sort_by(|a, b| a.institution_id.as_str().cmp(b.institution_id.as_str()));

        Ok(stats)
    }

    async fn stats_for(
        &self,
        institution: &Institution,
    ) -> Result<InstitutionUsageStats, MeteringError> {
        let license = match &institution.license_id {
            Some(license_id) => self.licenses.get(license_id).await?,
            None => None,
        };

        let period = PeriodKey::current();
        let bucket = TenantBucket::Institution(institution.id().clone());
        let key = AggregationKey::new(&bucket, &period);
        let totals = self
            .counters
            .get(&key)
            .await?
            .map(|document| document.totals)
            .unwrap_or_default();

        let dimensions = match &license {
            Some(license) => QuotaDimension::ALL
                .iter()
                .map(|&dimension| {
                    let used = totals.used(dimension);
                    let limit = license.quotas.limit(dimension);

                    DimensionUsage {
                        dimension,
                        used,
                        limit,
                        percent_used: limit.percent_used(used),
                    }
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(InstitutionUsageStats {
            institution_id: institution.id().clone(),
            name: institution.name.clone(),
            period,
            license,
            totals,
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::license::LicenseTier;
    use crate::domain::usage::UsageAggregation;
    use crate::infrastructure::storage::InMemoryStorage;
    use crate::infrastructure::usage::InMemoryAggregationStore;

    #[tokio::test]
    async fn test_stats_combine_license_and_totals() {
        let institutions = Arc::new(InMemoryStorage::with_entities(vec![
            Institution::new("inst-1", "Springfield High").with_license("lic-1"),
        ]));
        let licenses = Arc::new(InMemoryStorage::with_entities(vec![License::new(
            "lic-1",
            LicenseTier::Free,
        )
        .with_institution("inst-1")]));
        let counters = Arc::new(InMemoryAggregationStore::new());

        let bucket = TenantBucket::Institution("inst-1".into());
        let update = |document: &mut UsageAggregation| {
            document.totals.total_calls += 3;
            document.totals.text_tokens += 25_000;
            document.totals.cost_micros += 1_500;
        };
        counters
            .transact(&bucket, &PeriodKey::current(), &update)
            .await
            .unwrap();

        let service = UsageStatsService::new(institutions, licenses, counters);
        let stats = service
            .institution_usage_stats(&"inst-1".into())
            .await
            .unwrap();

        assert_eq!(stats.totals.total_calls, 3);

        let tokens = stats
            .dimensions
            .iter()
            .find(|d| d.dimension == QuotaDimension::TextTokens)
            .unwrap();
        assert_eq!(tokens.used, 25_000);
        assert!((tokens.percent_used - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_institution_without_usage_reports_zeroes() {
        let institutions = Arc::new(InMemoryStorage::with_entities(vec![Institution::new(
            "inst-2", "Shelbyville",
        )]));
        let licenses: Arc<InMemoryStorage<License>> = Arc::new(InMemoryStorage::new());
        let counters = Arc::new(InMemoryAggregationStore::new());

        let service = UsageStatsService::new(institutions, licenses, counters);
        let all = service.all_institutions_usage().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].totals.total_calls, 0);
        assert!(all[0].license.is_none());
        assert!(all[0].dimensions.is_empty());
    }
}
