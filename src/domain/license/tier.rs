//! License tiers and their preset defaults

use serde::{Deserialize, Serialize};

use super::entity::{Capability, Limit, OveragePolicy, QuotaSet};

/// Named license level with preset quotas, capabilities and overage policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseTier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl std::fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Basic => write!(f, "basic"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Preset values a license inherits from its tier
#[derive(Debug, Clone)]
pub struct TierDefaults {
    pub quotas: QuotaSet,
    pub capabilities: Vec<Capability>,
    pub overage: OveragePolicy,
}

impl LicenseTier {
    /// Defaults merged into every license of this tier; per-license
    /// overrides win over these values.
    pub fn defaults(&self) -> TierDefaults {
        match self {
            Self::Free => TierDefaults {
                quotas: QuotaSet {
                    text_tokens: Limit::Bounded(50_000),
                    image_generations: Limit::Bounded(10),
                    audio_minutes: Limit::Bounded(30),
                    podcast_generations: Limit::Bounded(0),
                },
                capabilities: vec![
                    Capability::LessonGeneration,
                    Capability::TocExtraction,
                    Capability::ChatAssist,
                ],
                overage: OveragePolicy::hard(),
            },
            Self::Basic => TierDefaults {
                quotas: QuotaSet {
                    text_tokens: Limit::Bounded(500_000),
                    image_generations: Limit::Bounded(100),
                    audio_minutes: Limit::Bounded(300),
                    podcast_generations: Limit::Bounded(10),
                },
                capabilities: vec![
                    Capability::LessonGeneration,
                    Capability::ExamGeneration,
                    Capability::TocExtraction,
                    Capability::ImageGeneration,
                    Capability::ChatAssist,
                ],
                overage: OveragePolicy::with_overage(2_000, 10),
            },
            Self::Pro => TierDefaults {
                quotas: QuotaSet {
                    text_tokens: Limit::Bounded(2_000_000),
                    image_generations: Limit::Bounded(500),
                    audio_minutes: Limit::Bounded(1_200),
                    podcast_generations: Limit::Bounded(50),
                },
                capabilities: vec![
                    Capability::LessonGeneration,
                    Capability::ExamGeneration,
                    Capability::TocExtraction,
                    Capability::ImageGeneration,
                    Capability::AudioNarration,
                    Capability::PodcastGeneration,
                    Capability::ChatAssist,
                ],
                overage: OveragePolicy::with_overage(1_500, 20),
            },
            Self::Enterprise => TierDefaults {
                quotas: QuotaSet::unlimited(),
                capabilities: vec![
                    Capability::LessonGeneration,
                    Capability::ExamGeneration,
                    Capability::TocExtraction,
                    Capability::ImageGeneration,
                    Capability::AudioNarration,
                    Capability::PodcastGeneration,
                    Capability::ChatAssist,
                ],
                overage: OveragePolicy::with_overage(0, 0),
            },
        }
    }
}
