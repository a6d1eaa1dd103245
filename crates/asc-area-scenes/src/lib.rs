//! Per-area scene selectors
//!
//! For every area that contains at least one scene entity, this crate
//! maintains a select entity whose options are the area's scene names.
//! Picking an option activates the scene; scenes activated from anywhere
//! else are mirrored back into the selector. A coordinator watches the area
//! and entity registries and reconciles the selector set whenever the
//! topology changes.
//!
//! Entry point is [`setup`], which wires the coordinator and the selector
//! manager to a running event bus, state store, and service registry.

mod coordinator;
mod customize;
mod lifecycle;
mod select;
mod snapshot;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use asc_core::EventData;
use asc_event_bus::EventBus;
use asc_registries::{AreaRegistry, EntityRegistry};
use asc_service_registry::ServiceRegistry;
use asc_state_store::StateStore;

pub use coordinator::{
    AreaScenesCoordinator, RefreshError, RegistrySnapshotSource, SnapshotError, SnapshotSource,
    Subscription,
};
pub use customize::{customize_from_options, Customization, CustomizeMap};
pub use lifecycle::SelectorManager;
pub use select::{AreaSceneSelect, SelectDeps, SelectError, SelectTimings};
pub use snapshot::{build_snapshot, AreaScenesSnapshot};

/// Integration domain
pub const DOMAIN: &str = "area_scenes";

/// The momentary option a reset-mode selector snaps back to
pub const RESET_OPTION: &str = "None";

/// Event fired when a scene is activated through a selector
pub const EVENT_SCENE_SELECTED: &str = "area_scenes_scene_selected";

/// Data for [`EVENT_SCENE_SELECTED`] events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSelectedData {
    pub area_id: String,
    pub scene_name: String,
    pub scene_entity_id: String,
}

impl EventData for SceneSelectedData {
    fn event_type() -> &'static str {
        EVENT_SCENE_SELECTED
    }
}

/// Errors from [`setup`]
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("initial snapshot refresh failed: {0}")]
    InitialRefresh(#[from] RefreshError),
}

/// Handle to a running area-scenes integration
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) stops
/// the background tasks but leaves selector states in the store.
pub struct AreaScenes {
    coordinator: Arc<AreaScenesCoordinator>,
    manager: Arc<SelectorManager>,
}

impl AreaScenes {
    pub fn coordinator(&self) -> &Arc<AreaScenesCoordinator> {
        &self.coordinator
    }

    pub fn manager(&self) -> &Arc<SelectorManager> {
        &self.manager
    }

    /// Tear down all selectors and stop the coordinator
    pub fn shutdown(&self) {
        self.manager.shutdown();
        self.coordinator.shutdown();
    }
}

/// Set up the integration with default timings
///
/// `options` is the integration's raw configuration object; its `customize`
/// key holds per-area overrides.
pub async fn setup(
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    areas: Arc<AreaRegistry>,
    entities: Arc<EntityRegistry>,
    options: &serde_json::Value,
) -> Result<AreaScenes, SetupError> {
    setup_with_timings(
        bus,
        states,
        services,
        areas,
        entities,
        options,
        SelectTimings::default(),
    )
    .await
}

/// Set up the integration with explicit timings
pub async fn setup_with_timings(
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    areas: Arc<AreaRegistry>,
    entities: Arc<EntityRegistry>,
    options: &serde_json::Value,
    timings: SelectTimings,
) -> Result<AreaScenes, SetupError> {
    let source = Arc::new(RegistrySnapshotSource::new(areas, Arc::clone(&entities)));
    let coordinator = AreaScenesCoordinator::new(source, Arc::clone(&bus), entities);
    coordinator.start();
    coordinator.request_refresh().await?;

    let customize = customize_from_options(options);
    let manager = SelectorManager::new(
        Arc::clone(&coordinator),
        SelectDeps {
            bus,
            states,
            services,
        },
        customize,
        timings,
    );
    manager.attach();

    info!(
        "Area scenes set up with {} selector(s)",
        manager.len()
    );

    Ok(AreaScenes {
        coordinator,
        manager,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_selected_event_roundtrip() {
        let data = SceneSelectedData {
            area_id: "area_1".to_string(),
            scene_name: "Movie Night".to_string(),
            scene_entity_id: "scene.movie_night".to_string(),
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["scene_name"], "Movie Night");
        let back: SceneSelectedData = serde_json::from_value(value).unwrap();
        assert_eq!(back.scene_entity_id, "scene.movie_night");
        assert_eq!(SceneSelectedData::event_type(), EVENT_SCENE_SELECTED);
    }
}
