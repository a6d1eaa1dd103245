//! Entity Registry
//!
//! Tracks registered entities with an area index for fast per-area lookups.
//! Mutations fire ENTITY_REGISTRY_UPDATED events on the bus; the events carry
//! only the entity id, so consumers recover the domain through a lookup.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use asc_core::events::{EntityRegistryUpdatedData, RegistryAction};
use asc_core::{Context, EntityId, EntityIdError};
use asc_event_bus::EventBus;

use crate::storage::{Storable, Storage, StorageFile, StorageResult};

/// Errors that can occur in the entity registry
#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    /// Entity was not found
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Entity id was not a valid domain.object_id pair
    #[error("Invalid entity id: {0}")]
    InvalidId(#[from] EntityIdError),
}

/// Storage key for the entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id (lowercase ULID)
    pub id: String,
    /// Full entity id (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Component/platform that provides this entity
    pub platform: String,

    /// Area this entity is located in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,

    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform default name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    fn new(entity_id: &EntityId, platform: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.to_string(),
            unique_id: None,
            platform: platform.into(),
            area_id: None,
            name: None,
            original_name: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// The domain segment of the entity id
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }

    /// Display name: user-set name, else platform name, else the object id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.original_name.as_deref())
            .unwrap_or_else(|| {
                self.entity_id
                    .split('.')
                    .nth(1)
                    .unwrap_or(&self.entity_id)
            })
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    /// All registered entities
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
}

/// Entity Registry
pub struct EntityRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Event bus for change notifications
    bus: Arc<EventBus>,

    /// Primary index: entity_id -> EntityEntry
    by_id: DashMap<String, Arc<EntityEntry>>,

    /// Index: area_id -> set of entity_ids
    by_area_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    /// Create a new entity registry
    pub fn new(storage: Arc<Storage>, bus: Arc<EventBus>) -> Self {
        Self {
            storage,
            bus,
            by_id: DashMap::new(),
            by_area_id: DashMap::new(),
        }
    }

    /// Load from storage
    ///
    /// Loading does not fire change events; only runtime mutations do.
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<EntityRegistryData>(STORAGE_KEY).await? {
            info!(
                "Loading {} entities from storage (v{})",
                storage_file.data.entities.len(),
                storage_file.version
            );

            for entry in storage_file.data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self.by_id.iter().map(|r| (**r.value()).clone()).collect(),
        };

        let storage_file = StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION);
        self.storage.save(&storage_file).await?;
        debug!("Saved {} entities to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        if let Some(ref area_id) = entry.area_id {
            self.by_area_id
                .entry(area_id.clone())
                .or_default()
                .insert(entry.entity_id.clone());
        }
        self.by_id.insert(entry.entity_id.clone(), entry);
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        if let Some(ref area_id) = entry.area_id {
            if let Some(mut ids) = self.by_area_id.get_mut(area_id) {
                ids.remove(&entry.entity_id);
            }
        }
    }

    /// Get an entity by its entity id
    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_id.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    /// Get all entities located in an area
    pub fn get_by_area_id(&self, area_id: &str) -> Vec<Arc<EntityEntry>> {
        self.by_area_id
            .get(area_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get an existing entity or register a new one
    pub fn get_or_create(
        &self,
        entity_id: &str,
        platform: &str,
    ) -> Result<Arc<EntityEntry>, EntityRegistryError> {
        if let Some(existing) = self.get(entity_id) {
            return Ok(existing);
        }

        let parsed: EntityId = entity_id.parse()?;
        let entry = Arc::new(EntityEntry::new(&parsed, platform));
        info!("Registered entity: {} ({})", entity_id, entry.id);
        self.index_entry(Arc::clone(&entry));
        self.notify(RegistryAction::Create, entity_id);
        Ok(entry)
    }

    /// Update an entity, returning the updated entry
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        // Remove and re-insert so the area index stays consistent when
        // area_id changes.
        let (_, old) = self
            .by_id
            .remove(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;
        self.unindex_entry(&old);

        let mut entry = (*old).clone();
        f(&mut entry);
        entry.modified_at = Utc::now();

        let arc = Arc::new(entry);
        self.index_entry(Arc::clone(&arc));
        self.notify(RegistryAction::Update, entity_id);
        Ok(arc)
    }

    /// Remove an entity, returning the removed entry
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let (_, entry) = self.by_id.remove(entity_id)?;
        self.unindex_entry(&entry);
        info!("Removed entity: {}", entity_id);
        self.notify(RegistryAction::Remove, entity_id);
        Some(entry)
    }

    /// Get count of entities
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all entities
    pub fn iter(&self) -> impl Iterator<Item = Arc<EntityEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }

    fn notify(&self, action: RegistryAction, entity_id: &str) {
        self.bus.fire_typed(
            EntityRegistryUpdatedData {
                action,
                entity_id: entity_id.to_string(),
            },
            Context::new(),
        );
    }
}
