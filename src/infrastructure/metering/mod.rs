pub mod recorder;
pub mod side_channel;
pub mod stats;
pub mod tracker;

pub use recorder::{RecordedUsage, UsageRecorder};
pub use side_channel::UsageSideChannel;
pub use stats::{DimensionUsage, InstitutionUsageStats, UsageStatsService};
pub use tracker::{AiCallTracker, TrackedCall};
