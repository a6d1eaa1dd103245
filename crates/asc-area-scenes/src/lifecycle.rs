//! Selector lifecycle management
//!
//! Keeps the set of live selectors in step with the snapshot: one selector
//! per area that has at least one scene. Areas that gain their first scene
//! get a selector, areas that lose their last scene (or disappear entirely)
//! get theirs torn down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::coordinator::{AreaScenesCoordinator, Subscription};
use crate::customize::CustomizeMap;
use crate::select::{AreaSceneSelect, SelectDeps, SelectTimings};
use crate::snapshot::AreaScenesSnapshot;

/// Owns the live selectors and reconciles them against each snapshot
pub struct SelectorManager {
    coordinator: Arc<AreaScenesCoordinator>,
    deps: SelectDeps,
    customize: CustomizeMap,
    timings: SelectTimings,
    /// Live selectors, keyed by area id
    selects: Mutex<HashMap<String, Arc<AreaSceneSelect>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SelectorManager {
    pub fn new(
        coordinator: Arc<AreaScenesCoordinator>,
        deps: SelectDeps,
        customize: CustomizeMap,
        timings: SelectTimings,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            deps,
            customize,
            timings,
            selects: Mutex::new(HashMap::new()),
            subscription: Mutex::new(None),
        })
    }

    /// Subscribe to snapshot updates and reconcile against the current one
    pub fn attach(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = self.coordinator.subscribe(move |snapshot| {
            if let Some(manager) = weak.upgrade() {
                manager.apply(snapshot);
            }
        });
        *self.subscription.lock().unwrap() = Some(subscription);

        if let Some(snapshot) = self.coordinator.current() {
            self.apply(&snapshot);
        }
    }

    /// Reconcile the selector set against a snapshot
    ///
    /// Teardown happens first so an area that was renamed into a new id in
    /// one refresh releases its old entity id before the new selector claims
    /// one.
    fn apply(&self, snapshot: &Arc<AreaScenesSnapshot>) {
        let mut selects = self.selects.lock().unwrap();

        let stale: Vec<String> = selects
            .keys()
            .filter(|area_id| {
                !snapshot.has_area(area_id) || snapshot.scenes_for(area_id).is_empty()
            })
            .cloned()
            .collect();
        for area_id in stale {
            if let Some(select) = selects.remove(&area_id) {
                info!(
                    "Removing scene selector {} for area '{}'",
                    select.entity_id(),
                    area_id
                );
                select.shutdown();
            }
        }

        for (area_id, scenes) in &snapshot.scenes {
            if selects.contains_key(area_id) {
                continue;
            }
            let Some(area) = snapshot.areas.get(area_id) else {
                continue;
            };
            let customization = self.customize.get(area_id).cloned().unwrap_or_default();
            match AreaSceneSelect::new(
                &self.coordinator,
                area,
                scenes,
                customization,
                self.timings.clone(),
                self.deps.clone(),
            ) {
                Ok(select) => {
                    info!(
                        "Created scene selector {} for area '{}' with {} scene(s)",
                        select.entity_id(),
                        area.name,
                        scenes.len()
                    );
                    selects.insert(area_id.clone(), Arc::new(select));
                }
                Err(err) => {
                    warn!(
                        "Skipping scene selector for area '{}': {}",
                        area.name, err
                    );
                }
            }
        }

        debug!("Selector reconciliation done; {} live", selects.len());
    }

    /// The selector for an area, if one is live
    pub fn get(&self, area_id: &str) -> Option<Arc<AreaSceneSelect>> {
        self.selects.lock().unwrap().get(area_id).cloned()
    }

    /// All live selectors
    pub fn selects(&self) -> Vec<Arc<AreaSceneSelect>> {
        self.selects.lock().unwrap().values().cloned().collect()
    }

    /// Number of live selectors
    pub fn len(&self) -> usize {
        self.selects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selects.lock().unwrap().is_empty()
    }

    /// Tear down every selector and stop tracking snapshots
    pub fn shutdown(&self) {
        self.subscription.lock().unwrap().take();
        let mut selects = self.selects.lock().unwrap();
        for (_, select) in selects.drain() {
            select.shutdown();
        }
    }
}
