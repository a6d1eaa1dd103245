//! Registry snapshot builder
//!
//! Produces an immutable area -> scenes mapping from the two registries.
//! Snapshots are replaced wholesale on every refresh and never mutated in
//! place, so readers never observe a torn intermediate state.

use std::sync::Arc;

use indexmap::IndexMap;

use asc_core::SCENE_DOMAIN;
use asc_registries::{AreaEntry, AreaRegistry, EntityEntry, EntityRegistry};

/// A consistent view of the areas and the scene entities located in them
///
/// Invariants:
/// - every entry in `scenes[area_id]` has `area_id` as its owning area;
/// - an area with no scenes does not appear in `scenes` at all;
/// - both maps iterate in sorted-id order, so derived option lists are
///   stable across refreshes.
#[derive(Debug, Clone, Default)]
pub struct AreaScenesSnapshot {
    /// All registered areas, keyed by area id
    pub areas: IndexMap<String, Arc<AreaEntry>>,
    /// Scene entities grouped by owning area id
    pub scenes: IndexMap<String, Vec<Arc<EntityEntry>>>,
}

impl AreaScenesSnapshot {
    /// The scene entities of an area, empty if the area has none
    pub fn scenes_for(&self, area_id: &str) -> &[Arc<EntityEntry>] {
        self.scenes.get(area_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the area exists in this snapshot
    pub fn has_area(&self, area_id: &str) -> bool {
        self.areas.contains_key(area_id)
    }
}

/// Build a snapshot from the current registry contents
///
/// Pure read: groups all entities with domain "scene" and a non-null owning
/// area by area id. The backing concurrent maps iterate unordered, so areas
/// and per-area scene lists are sorted by id for deterministic output.
pub fn build_snapshot(areas: &AreaRegistry, entities: &EntityRegistry) -> AreaScenesSnapshot {
    let mut area_entries: Vec<Arc<AreaEntry>> = areas.iter().collect();
    area_entries.sort_by(|a, b| a.id.cmp(&b.id));

    let area_map: IndexMap<String, Arc<AreaEntry>> = area_entries
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();

    let mut scenes: IndexMap<String, Vec<Arc<EntityEntry>>> = IndexMap::new();
    for entity in entities.iter() {
        if entity.domain() != SCENE_DOMAIN {
            continue;
        }
        let Some(area_id) = entity.area_id.clone() else {
            continue;
        };
        scenes.entry(area_id).or_default().push(entity);
    }

    // Registry ids are monotonic ULIDs, so this is registration order
    for list in scenes.values_mut() {
        list.sort_by(|a, b| a.id.cmp(&b.id));
    }
    scenes.sort_keys();

    AreaScenesSnapshot {
        areas: area_map,
        scenes,
    }
}
