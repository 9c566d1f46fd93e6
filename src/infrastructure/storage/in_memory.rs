//! In-memory storage implementation

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::MeteringError;

/// In-memory storage backed by a `RwLock<HashMap>`
///
/// The default backend for tests and single-process deployments.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<HashMap<String, E>>,
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the store with entities; later duplicates win
    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let map = entities
            .into_iter()
            .map(|e| (e.key().as_str().to_string(), e))
            .collect();

        Self {
            entities: RwLock::new(map),
        }
    }
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, MeteringError> {
        let entities = self
            .entities
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(entities.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, MeteringError> {
        let entities = self
            .entities
            .read()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire read lock: {}", e)))?;

        Ok(entities.values().cloned().collect())
    }

    async fn create(&self, entity: E) -> Result<E, MeteringError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self
            .entities
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if entities.contains_key(&key) {
            return Err(MeteringError::conflict(format!(
                "Entity with key '{}' already exists",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, MeteringError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self
            .entities
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        if !entities.contains_key(&key) {
            return Err(MeteringError::not_found(format!(
                "Entity with key '{}' not found",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, MeteringError> {
        let mut entities = self
            .entities
            .write()
            .map_err(|e| MeteringError::internal(format!("Failed to acquire write lock: {}", e)))?;

        Ok(entities.remove(key.as_str()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::institution::{Institution, InstitutionId};

    #[tokio::test]
    async fn test_create_and_get() {
        let storage = InMemoryStorage::new();
        let institution = Institution::new("inst-1", "Test School");

        storage.create(institution).await.unwrap();

        let fetched = storage.get(&InstitutionId::new("inst-1")).await.unwrap();
        assert_eq!(fetched.unwrap().name, "Test School");
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let storage = InMemoryStorage::with_entities([Institution::new("inst-1", "A")]);

        let result = storage.create(Institution::new("inst-1", "B")).await;

        assert!(matches!(result, Err(MeteringError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_missing_entity() {
        let storage: InMemoryStorage<Institution> = InMemoryStorage::new();

        let result = storage.update(Institution::new("inst-1", "A")).await;

        assert!(matches!(result, Err(MeteringError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let storage: InMemoryStorage<Institution> = InMemoryStorage::new();

        storage.save(Institution::new("inst-1", "A")).await.unwrap();
        storage.save(Institution::new("inst-1", "B")).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        let fetched = storage.get(&InstitutionId::new("inst-1")).await.unwrap();
        assert_eq!(fetched.unwrap().name, "B");
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = InMemoryStorage::with_entities([Institution::new("inst-1", "A")]);

        assert!(storage.delete(&InstitutionId::new("inst-1")).await.unwrap());
        assert!(!storage.delete(&InstitutionId::new("inst-1")).await.unwrap());
    }
}
