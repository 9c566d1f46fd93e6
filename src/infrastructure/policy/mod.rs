pub mod resolver;

pub use resolver::{EffectiveLicense, LicenseResolver};
