//! Notification domain - deduplicated tenant alerts

mod entity;

pub use entity::{Notification, NotificationId, NotificationKind};
