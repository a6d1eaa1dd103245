//! Per-area scene selector
//!
//! Each selector presents the scene names of one area as options, activates
//! the matching scene on selection, and mirrors externally-driven scene
//! activations back into its displayed option. Self-caused activations echo
//! back through the same state-changed channel, so a short-lived guard flag
//! suppresses the listener while a selection is propagating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use asc_core::events::StateChangedData;
use asc_core::{
    Context, EntityId, EntityIdError, SCENE_DOMAIN, SELECT_DOMAIN, STATE_UNAVAILABLE,
    STATE_UNKNOWN,
};
use asc_event_bus::EventBus;
use asc_registries::{AreaEntry, EntityEntry};
use asc_service_registry::{ServiceError, ServiceRegistry};
use asc_state_store::StateStore;

use crate::coordinator::{AreaScenesCoordinator, Subscription};
use crate::customize::Customization;
use crate::snapshot::AreaScenesSnapshot;
use crate::{SceneSelectedData, DOMAIN, RESET_OPTION};

/// Default icon when the customization doesn't override it
const DEFAULT_ICON: &str = "mdi:palette-outline";

/// Errors surfaced by a selector
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("invalid selector entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("scene activation failed: {0}")]
    Activation(#[from] ServiceError),
}

/// The two delays of the selection state machine
///
/// Scene activation has no acknowledgement the display could wait for, so
/// both the snap-back in reset mode and the end of feedback suppression are
/// fixed delays. The constructor clamps `guard_duration` to at least
/// `reset_delay`: the guard must outlive the reset transition or the reset
/// itself could be misread as an external activation.
#[derive(Debug, Clone)]
pub struct SelectTimings {
    /// Delay before a momentary selection snaps back to the reset option
    pub reset_delay: Duration,
    /// How long the self-activation guard stays up after a selection
    pub guard_duration: Duration,
}

impl SelectTimings {
    pub fn new(reset_delay: Duration, guard_duration: Duration) -> Self {
        Self {
            reset_delay,
            guard_duration: guard_duration.max(reset_delay),
        }
    }
}

impl Default for SelectTimings {
    fn default() -> Self {
        Self {
            reset_delay: Duration::from_millis(100),
            guard_duration: Duration::from_millis(200),
        }
    }
}

/// Shared handles every selector needs
#[derive(Clone)]
pub struct SelectDeps {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
}

/// A scene selector for one area
pub struct AreaSceneSelect {
    inner: Arc<SelectInner>,
    listener: JoinHandle<()>,
    _topology: Subscription,
}

struct SelectInner {
    deps: SelectDeps,
    area_id: String,
    entity_id: EntityId,
    unique_id: String,
    friendly_name: String,
    icon: String,
    color: Option<String>,
    reset_mode: bool,
    timings: SelectTimings,

    area_name: RwLock<String>,
    /// This area's scene entities, keyed by entity id
    scene_entities: RwLock<HashMap<String, Arc<EntityEntry>>>,
    /// Display name -> entity id, in option order
    name_map: RwLock<IndexMap<String, String>>,

    current_option: RwLock<Option<String>>,
    /// True between "selection initiated" and "propagation window elapsed";
    /// the sole guard between selection-in-progress and external events.
    is_activating: AtomicBool,
    /// False once the owning area left the snapshot
    available: AtomicBool,
    /// False once the selector is torn down; late continuations check this
    /// and become no-ops.
    active: AtomicBool,
}

impl AreaSceneSelect {
    /// Create a selector for an area and publish its initial state
    pub fn new(
        coordinator: &Arc<AreaScenesCoordinator>,
        area: &Arc<AreaEntry>,
        scenes: &[Arc<EntityEntry>],
        customization: Customization,
        timings: SelectTimings,
        deps: SelectDeps,
    ) -> Result<Self, SelectError> {
        let entity_id = select_entity_id(area)?;
        let friendly_name = customization
            .name
            .clone()
            .unwrap_or_else(|| format!("{} Scenes", area.name));
        let icon = customization
            .icon
            .clone()
            .unwrap_or_else(|| DEFAULT_ICON.to_string());
        let reset_mode = customization.reset_mode;

        let inner = Arc::new(SelectInner {
            deps,
            area_id: area.id.clone(),
            unique_id: format!("{}_{}_scenes", DOMAIN, area.id),
            entity_id,
            friendly_name,
            icon,
            color: customization.color,
            reset_mode,
            timings,
            area_name: RwLock::new(area.name.clone()),
            scene_entities: RwLock::new(HashMap::new()),
            name_map: RwLock::new(IndexMap::new()),
            current_option: RwLock::new(if reset_mode {
                Some(RESET_OPTION.to_string())
            } else {
                None
            }),
            is_activating: AtomicBool::new(false),
            available: AtomicBool::new(true),
            active: AtomicBool::new(true),
        });

        inner.rebuild_maps(scenes);
        inner.write_state();

        // Watch for scene activations from anywhere in the system
        let listener = {
            let inner = Arc::clone(&inner);
            let mut rx = inner.deps.bus.subscribe_typed::<StateChangedData>();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    inner.handle_scene_event(&event.data);
                }
            })
        };

        // Track topology changes through the coordinator
        let topology = {
            let weak = Arc::downgrade(&inner);
            coordinator.subscribe(move |snapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_snapshot(snapshot);
                }
            })
        };

        Ok(Self {
            inner,
            listener,
            _topology: topology,
        })
    }

    /// The selector's own entity id (select domain)
    pub fn entity_id(&self) -> &EntityId {
        &self.inner.entity_id
    }

    /// Stable unique id derived from the area id
    pub fn unique_id(&self) -> &str {
        &self.inner.unique_id
    }

    /// The owning area id
    pub fn area_id(&self) -> &str {
        &self.inner.area_id
    }

    /// The currently displayed option
    pub fn current_option(&self) -> Option<String> {
        self.inner.current_option.read().unwrap().clone()
    }

    /// The selectable options, reset option last when enabled
    pub fn options(&self) -> Vec<String> {
        self.inner.options()
    }

    /// False once the owning area left the snapshot
    pub fn available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Select an option, activating the matching scene
    pub async fn select_option(&self, option: &str) -> Result<(), SelectError> {
        Arc::clone(&self.inner).select_option(option).await
    }

    /// Tear the selector down: stop listening and remove the published state
    pub(crate) fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.listener.abort();
        self.inner
            .deps
            .states
            .remove(&self.inner.entity_id, Context::new());
    }
}

impl Drop for AreaSceneSelect {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.listener.abort();
    }
}

impl SelectInner {
    async fn select_option(self: Arc<Self>, option: &str) -> Result<(), SelectError> {
        {
            let current = self.current_option.read().unwrap();
            // Re-selecting the current option is a no-op, except for the
            // reset option which is always re-selectable
            if current.as_deref() == Some(option) && option != RESET_OPTION {
                return Ok(());
            }
        }

        self.is_activating.store(true, Ordering::SeqCst);
        *self.current_option.write().unwrap() = Some(option.to_string());
        self.write_state();

        if option == RESET_OPTION {
            // Nothing to activate; no propagation window needed
            self.is_activating.store(false, Ordering::SeqCst);
            return Ok(());
        }

        let target = self.name_map.read().unwrap().get(option).cloned();

        let result = match target {
            Some(scene_entity_id) => {
                info!(
                    "Activating scene '{}' ({}) from selector {}",
                    option, scene_entity_id, self.entity_id
                );
                // Announce the selection for external automations before the
                // activation itself
                self.deps.bus.fire_typed(
                    SceneSelectedData {
                        area_id: self.area_id.clone(),
                        scene_name: option.to_string(),
                        scene_entity_id: scene_entity_id.clone(),
                    },
                    Context::new(),
                );

                self.deps
                    .services
                    .call(
                        SCENE_DOMAIN,
                        "turn_on",
                        json!({ "entity_id": scene_entity_id }),
                        Context::new(),
                    )
                    .await
                    .map_err(SelectError::from)
            }
            None => {
                warn!(
                    "No scene named '{}' in area '{}'; not activating",
                    option, self.area_id
                );
                Ok(())
            }
        };

        if self.reset_mode {
            let inner = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::time::sleep(inner.timings.reset_delay).await;
                if !inner.active.load(Ordering::SeqCst) {
                    return;
                }
                *inner.current_option.write().unwrap() = Some(RESET_OPTION.to_string());
                inner.write_state();
            });
        }

        // Drop the guard once the activation has had time to echo back
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.timings.guard_duration).await;
            inner.is_activating.store(false, Ordering::SeqCst);
        });

        result
    }

    /// React to a state-changed event that may name one of our scenes
    fn handle_scene_event(&self, data: &StateChangedData) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        // Only real transitions count; creation and removal of the entity
        // carry a missing side
        if data.old_state.is_none() || data.new_state.is_none() {
            return;
        }
        // Our own activation call echoing back
        if self.is_activating.load(Ordering::SeqCst) {
            return;
        }

        let scene_entity_id = data.entity_id.to_string();
        let entry = self
            .scene_entities
            .read()
            .unwrap()
            .get(&scene_entity_id)
            .cloned();
        let Some(entry) = entry else {
            return;
        };

        let scene_name = entry.display_name().to_string();
        debug!(
            "Scene '{}' activated externally in area '{}'; updating selector",
            scene_name, self.area_id
        );
        *self.current_option.write().unwrap() = Some(scene_name);
        self.write_state();
    }

    /// Recompute scene membership and availability from a new snapshot
    ///
    /// Does not touch the displayed option.
    fn apply_snapshot(&self, snapshot: &Arc<AreaScenesSnapshot>) {
        self.rebuild_maps(snapshot.scenes_for(&self.area_id));

        let available = snapshot.has_area(&self.area_id);
        self.available.store(available, Ordering::SeqCst);
        if let Some(area) = snapshot.areas.get(&self.area_id) {
            *self.area_name.write().unwrap() = area.name.clone();
        }

        self.write_state();
    }

    fn rebuild_maps(&self, scenes: &[Arc<EntityEntry>]) {
        let mut entities = HashMap::new();
        let mut names = IndexMap::new();
        for scene in scenes {
            entities.insert(scene.entity_id.clone(), Arc::clone(scene));
            names.insert(scene.display_name().to_string(), scene.entity_id.clone());
        }
        *self.scene_entities.write().unwrap() = entities;
        *self.name_map.write().unwrap() = names;
    }

    fn options(&self) -> Vec<String> {
        let mut options: Vec<String> = self.name_map.read().unwrap().keys().cloned().collect();
        if self.reset_mode {
            options.push(RESET_OPTION.to_string());
        }
        options
    }

    /// Publish the selector's state into the state store
    fn write_state(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }

        let state = if !self.available.load(Ordering::SeqCst) {
            STATE_UNAVAILABLE.to_string()
        } else {
            self.current_option
                .read()
                .unwrap()
                .clone()
                .unwrap_or_else(|| STATE_UNKNOWN.to_string())
        };

        let member_scenes: Vec<String> =
            self.name_map.read().unwrap().values().cloned().collect();

        let attributes = HashMap::from([
            ("friendly_name".to_string(), json!(self.friendly_name)),
            ("icon".to_string(), json!(self.icon)),
            ("options".to_string(), json!(self.options())),
            ("area_id".to_string(), json!(self.area_id)),
            ("color".to_string(), json!(self.color)),
            ("reset_mode".to_string(), json!(self.reset_mode)),
            ("scene_entities".to_string(), json!(member_scenes)),
        ]);

        self.deps
            .states
            .set(self.entity_id.clone(), state, attributes, Context::new());
    }
}

/// Derive the selector's entity id from the area name
fn select_entity_id(area: &AreaEntry) -> Result<EntityId, EntityIdError> {
    let slug = slugify(&area.name);
    let base = if slug.is_empty() {
        area.id.clone()
    } else {
        slug
    };
    EntityId::new(SELECT_DOMAIN, format!("{}_scenes", base))
}

/// Lowercase, map non-alphanumerics to underscores, collapse and trim them
fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}
