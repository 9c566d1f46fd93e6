//! Institution domain - tenant records and rollup stats

mod entity;

pub use entity::{Institution, InstitutionId};
