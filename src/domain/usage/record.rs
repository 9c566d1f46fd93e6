//! Immutable usage-log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::directory::{UserId, UserRole};
use crate::domain::license::{Capability, QuotaDimension};
use crate::domain::storage::{StorageEntity, StorageKey};

use super::period::{PeriodKey, TenantBucket};

/// Unique identifier for a usage-log entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageLogId(String);

impl UsageLogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique ID
    pub fn generate() -> Self {
        Self(format!("usage-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UsageLogId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UsageLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for UsageLogId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of billable AI call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    LessonSkeleton,
    LessonContent,
    ExamGeneration,
    TocExtraction,
    ImageGeneration,
    AudioNarration,
    PodcastGeneration,
    ChatAssist,
}

impl CallType {
    /// Quota dimension this call consumes
    pub fn dimension(&self) -> QuotaDimension {
        match self {
            Self::LessonSkeleton
            | Self::LessonContent
            | Self::ExamGeneration
            | Self::TocExtraction
            | Self::ChatAssist => QuotaDimension::TextTokens,
            Self::ImageGeneration => QuotaDimension::ImageGenerations,
            Self::AudioNarration => QuotaDimension::AudioMinutes,
            Self::PodcastGeneration => QuotaDimension::PodcastGenerations,
        }
    }

    /// Capability the license must carry for this call
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::LessonSkeleton | Self::LessonContent => Capability::LessonGeneration,
            Self::ExamGeneration => Capability::ExamGeneration,
            Self::TocExtraction => Capability::TocExtraction,
            Self::ImageGeneration => Capability::ImageGeneration,
            Self::AudioNarration => Capability::AudioNarration,
            Self::PodcastGeneration => Capability::PodcastGeneration,
            Self::ChatAssist => Capability::ChatAssist,
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessonSkeleton => write!(f, "lesson_skeleton"),
            Self::LessonContent => write!(f, "lesson_content"),
            Self::ExamGeneration => write!(f, "exam_generation"),
            Self::TocExtraction => write!(f, "toc_extraction"),
            Self::ImageGeneration => write!(f, "image_generation"),
            Self::AudioNarration => write!(f, "audio_narration"),
            Self::PodcastGeneration => write!(f, "podcast_generation"),
            Self::ChatAssist => write!(f, "chat_assist"),
        }
    }
}

/// Outcome of the wrapped provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Error,
    RateLimited,
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// Token counts extracted from a provider response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Extract token counts from either known provider response shape:
    /// `{"usage": {"prompt_tokens", "completion_tokens"}}` or
    /// `{"usageMetadata": {"promptTokenCount", "candidatesTokenCount"}}`.
    /// Unknown shapes yield zero usage.
    pub fn from_response(response: &Value) -> Self {
        if let Some(usage) = response.get("usage") {
            return Self {
                input_tokens: u64_field(usage, "prompt_tokens"),
                output_tokens: u64_field(usage, "completion_tokens"),
            };
        }

        if let Some(meta) = response.get("usageMetadata") {
            return Self {
                input_tokens: u64_field(meta, "promptTokenCount"),
                output_tokens: u64_field(meta, "candidatesTokenCount"),
            };
        }

        Self::default()
    }
}

fn u64_field(value: &Value, field: &str) -> u64 {
    value.get(field).and_then(Value::as_u64).unwrap_or(0)
}

/// Units consumed by one call, across all four dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnits {
    pub tokens: TokenUsage,
    pub images: u64,
    pub audio_seconds: u64,
    pub podcasts: u64,
}

impl ResourceUnits {
    pub fn tokens(tokens: TokenUsage) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }

    pub fn with_images(mut self, images: u64) -> Self {
        self.images = images;
        self
    }

    pub fn with_audio_seconds(mut self, seconds: u64) -> Self {
        self.audio_seconds = seconds;
        self
    }

    pub fn with_podcasts(mut self, podcasts: u64) -> Self {
        self.podcasts = podcasts;
        self
    }
}

/// Where in the product the call originated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallContext {
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
    /// Name of the calling function, for audit trails
    pub origin: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn with_lesson(mut self, lesson_id: impl Into<String>) -> Self {
        self.lesson_id = Some(lesson_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Latency and reliability data for one call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallPerformance {
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub retry_count: u32,
}

/// Mutable draft of a usage event, before the recorder assigns identity,
/// cost and partition key
#[derive(Debug, Clone)]
pub struct UsageDraft {
    pub bucket: TenantBucket,
    pub user_id: UserId,
    pub role: UserRole,
    pub call_type: CallType,
    pub provider: String,
    pub model: String,
    pub units: ResourceUnits,
    pub context: CallContext,
    pub performance: CallPerformance,
    pub status: CallStatus,
}

impl UsageDraft {
    pub fn new(
        bucket: TenantBucket,
        user_id: impl Into<UserId>,
        role: UserRole,
        call_type: CallType,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            bucket,
            user_id: user_id.into(),
            role,
            call_type,
            provider: provider.into(),
            model: model.into(),
            units: ResourceUnits::default(),
            context: CallContext::default(),
            performance: CallPerformance::default(),
            status: CallStatus::Success,
        }
    }

    pub fn with_units(mut self, units: ResourceUnits) -> Self {
        self.units = units;
        self
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_performance(mut self, performance: CallPerformance) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_status(mut self, status: CallStatus) -> Self {
        self.status = status;
        self
    }
}

/// Append-only record of one billable AI call. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    id: UsageLogId,
    pub bucket: TenantBucket,
    pub period: PeriodKey,
    pub user_id: UserId,
    pub role: UserRole,
    pub call_type: CallType,
    pub provider: String,
    pub model: String,
    pub units: ResourceUnits,
    /// Estimated cost in micro-dollars
    pub cost_micros: i64,
    pub context: CallContext,
    pub performance: CallPerformance,
    pub status: CallStatus,
    pub timestamp: DateTime<Utc>,
}

impl UsageLogEntry {
    /// Seal a draft into an immutable record
    pub fn from_draft(
        id: UsageLogId,
        draft: UsageDraft,
        cost_micros: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            period: PeriodKey::from_datetime(at),
            bucket: draft.bucket,
            user_id: draft.user_id,
            role: draft.role,
            call_type: draft.call_type,
            provider: draft.provider,
            model: draft.model,
            units: draft.units,
            cost_micros,
            context: draft.context,
            performance: draft.performance,
            status: draft.status,
            timestamp: at,
        }
    }

    pub fn id(&self) -> &UsageLogId {
        &self.id
    }

    pub fn cost_usd(&self) -> f64 {
        self.cost_micros as f64 / 1_000_000.0
    }
}

impl StorageEntity for UsageLogEntry {
    type Key = UsageLogId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
