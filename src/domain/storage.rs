//! Generic storage abstraction for metered entities
//!
//! Licenses, institutions and notifications are read-mostly documents with a
//! single logical writer per key, so they share one CRUD contract. The
//! aggregation counters do NOT go through this trait; they have their own
//! transactional store (see [`crate::domain::usage::AtomicCounterStore`]).

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::MeteringError;

/// Trait for types that can be used as storage keys
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    /// Returns the key as a string for backends that require string keys
    fn as_str(&self) -> &str;
}

/// Trait for types that can be stored
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// The key type for this entity
    type Key: StorageKey;

    /// Returns the entity's key
    fn key(&self) -> &Self::Key;
}

/// Generic storage trait for CRUD operations on any entity type
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    /// Retrieves an entity by its key
    async fn get(&self, key: &E::Key) -> Result<Option<E>, MeteringError>;

    /// Retrieves all entities
    async fn list(&self) -> Result<Vec<E>, MeteringError>;

    /// Creates a new entity, returns error if already exists
    async fn create(&self, entity: E) -> Result<E, MeteringError>;

    /// Updates an existing entity, returns error if not found
    async fn update(&self, entity: E) -> Result<E, MeteringError>;

    /// Saves an entity (creates if not exists, updates if exists)
    async fn save(&self, entity: E) -> Result<E, MeteringError> {
        if self.exists(entity.key()).await? {
            self.update(entity).await
        } else {
            self.create(entity).await
        }
    }

    /// Deletes an entity by its key, returns true if deleted
    async fn delete(&self, key: &E::Key) -> Result<bool, MeteringError>;

    /// Checks if an entity exists by its key
    async fn exists(&self, key: &E::Key) -> Result<bool, MeteringError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Returns the count of entities
    async fn count(&self) -> Result<usize, MeteringError> {
        Ok(self.list().await?.len())
    }
}
