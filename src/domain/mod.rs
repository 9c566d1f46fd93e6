//! Domain layer: entities, value types and repository contracts

pub mod directory;
pub mod error;
pub mod institution;
pub mod license;
pub mod notification;
pub mod storage;
pub mod usage;

pub use error::MeteringError;
