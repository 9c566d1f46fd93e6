pub mod service;

pub use service::{NotificationService, CRITICAL_THRESHOLD_PERCENT, WARNING_THRESHOLD_PERCENT};
