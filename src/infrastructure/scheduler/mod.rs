pub mod jobs;

pub use jobs::{SchedulerJobs, SweepReport};
