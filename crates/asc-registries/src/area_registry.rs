//! Area Registry
//!
//! Tracks the physical areas (rooms, zones) of the deployment. Mutations
//! fire AREA_REGISTRY_UPDATED events on the bus.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use asc_core::events::{AreaRegistryUpdatedData, RegistryAction};
use asc_core::Context;
use asc_event_bus::EventBus;

use crate::storage::{Storable, Storage, StorageFile, StorageResult};

/// Storage key for the area registry
pub const STORAGE_KEY: &str = "core.area_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;

/// A registered area entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaEntry {
    /// Internal id (lowercase ULID)
    pub id: String,

    /// Area name (e.g., "Living Room")
    pub name: String,

    /// Area icon (e.g., "mdi:sofa")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last modified timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl AreaEntry {
    /// Create a new area entry
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            name: name.into(),
            icon: None,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Area registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaRegistryData {
    /// All registered areas
    pub areas: Vec<AreaEntry>,
}

impl Storable for AreaRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
}

/// Area Registry
///
/// Entries are stored as `Arc<AreaEntry>` to avoid cloning on reads.
pub struct AreaRegistry {
    /// Storage backend
    storage: Arc<Storage>,

    /// Event bus for change notifications
    bus: Arc<EventBus>,

    /// Primary index: area_id -> AreaEntry
    by_id: DashMap<String, Arc<AreaEntry>>,
}

impl AreaRegistry {
    /// Create a new area registry
    pub fn new(storage: Arc<Storage>, bus: Arc<EventBus>) -> Self {
        Self {
            storage,
            bus,
            by_id: DashMap::new(),
        }
    }

    /// Load from storage
    ///
    /// Loading does not fire change events; only runtime mutations do.
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(storage_file) = self.storage.load::<AreaRegistryData>(STORAGE_KEY).await? {
            info!(
                "Loading {} areas from storage (v{})",
                storage_file.data.areas.len(),
                storage_file.version
            );

            for entry in storage_file.data.areas {
                self.by_id.insert(entry.id.clone(), Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = AreaRegistryData {
            areas: self.by_id.iter().map(|r| (**r.value()).clone()).collect(),
        };

        let storage_file = StorageFile::new(STORAGE_KEY, data, STORAGE_VERSION);
        self.storage.save(&storage_file).await?;
        debug!("Saved {} areas to storage", self.by_id.len());
        Ok(())
    }

    /// Get area by id
    pub fn get(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        self.by_id.get(area_id).map(|r| Arc::clone(r.value()))
    }

    /// Create a new area
    pub fn create(&self, name: &str) -> Arc<AreaEntry> {
        let entry = Arc::new(AreaEntry::new(name));
        info!("Created area: {} ({})", name, entry.id);
        self.by_id.insert(entry.id.clone(), Arc::clone(&entry));
        self.notify(RegistryAction::Create, &entry.id);
        entry
    }

    /// Update an area, returning the updated entry
    pub fn update<F>(&self, area_id: &str, f: F) -> Option<Arc<AreaEntry>>
    where
        F: FnOnce(&mut AreaEntry),
    {
        let updated = {
            let mut slot = self.by_id.get_mut(area_id)?;
            let mut entry = (**slot.value()).clone();
            f(&mut entry);
            entry.modified_at = Utc::now();
            let arc = Arc::new(entry);
            *slot.value_mut() = Arc::clone(&arc);
            arc
        };
        self.notify(RegistryAction::Update, area_id);
        Some(updated)
    }

    /// Remove an area, returning the removed entry
    pub fn remove(&self, area_id: &str) -> Option<Arc<AreaEntry>> {
        let (_, entry) = self.by_id.remove(area_id)?;
        info!("Removed area: {}", area_id);
        self.notify(RegistryAction::Remove, area_id);
        Some(entry)
    }

    /// Get count of areas
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over all areas
    pub fn iter(&self) -> impl Iterator<Item = Arc<AreaEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }

    fn notify(&self, action: RegistryAction, area_id: &str) {
        self.bus.fire_typed(
            AreaRegistryUpdatedData {
                action,
                area_id: area_id.to_string(),
            },
            Context::new(),
        );
    }
}
