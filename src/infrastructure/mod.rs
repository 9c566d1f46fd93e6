//! Infrastructure layer - storage backends, metering services and jobs

pub mod admission;
pub mod directory;
pub mod logging;
pub mod metering;
pub mod notification;
pub mod policy;
pub mod scheduler;
pub mod storage;
pub mod usage;
