//! Registries for the area-scenes platform
//!
//! Tracks registered areas and entities with JSON persistence in the
//! `.storage/` directory. Unlike the state store, registry entries describe
//! topology (what exists and where it lives), not current values.
//!
//! Every mutation fires the matching `*_registry_updated` event on the bus
//! so downstream consumers (the area-scenes coordinator in particular) can
//! react to topology changes at runtime.

pub mod storage;

pub mod area_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use area_registry::{AreaEntry, AreaRegistry, AreaRegistryData};
pub use entity_registry::{
    EntityEntry, EntityRegistry, EntityRegistryData, EntityRegistryError,
};
