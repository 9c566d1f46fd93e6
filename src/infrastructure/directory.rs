//! In-memory directory lookup, seeded at startup

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::directory::{DirectoryLookup, UserId, UserIdentity};
use crate::domain::MeteringError;

/// Directory backed by a fixed map of seeded identities
#[derive(Debug, Default)]
pub struct StaticDirectory {
    identities: RwLock<HashMap<String, UserIdentity>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities(identities: Vec<UserIdentity>) -> Self {
        let map = identities
            .into_iter()
            .map(|identity| (identity.user_id.as_str().to_string(), identity))
            .collect();

        Self {
            identities: RwLock::new(map),
        }
    }

    pub fn insert(&self, identity: UserIdentity) -> Result<(), MeteringError> {
        let mut identities = self
            .identities
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        identities.insert(identity.user_id.as_str().to_string(), identity);

        Ok(())
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn identity(&self, user_id: &UserId) -> Result<Option<UserIdentity>, MeteringError> {
        let identities = self
            .identities
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(identities.get(user_id.as_str()).cloned())
    }
}
