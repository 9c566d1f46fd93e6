//! Identity directory port
//!
//! The engine does not own user accounts. It consumes a narrow lookup
//! interface that maps a user id to its institution membership and role.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::institution::InstitutionId;
use crate::domain::MeteringError;

/// Unique identifier for a platform user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a user inside an institution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Teacher,
    Student,
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Directory record for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    /// None for personal accounts outside any institution
    pub institution_id: Option<InstitutionId>,
    pub role: UserRole,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<UserId>, role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            institution_id: None,
            role,
        }
    }

    pub fn with_institution(mut self, institution_id: impl Into<InstitutionId>) -> Self {
        self.institution_id = Some(institution_id.into());
        self
    }
}

/// Lookup interface provided by the identity collaborator
#[async_trait]
pub trait DirectoryLookup: Send + Sync + Debug {
    /// Resolve a user id to its directory record, `None` if unknown
    async fn identity(&self, user_id: &UserId) -> Result<Option<UserIdentity>, MeteringError>;
}
