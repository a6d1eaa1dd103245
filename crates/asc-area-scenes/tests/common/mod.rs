//! Shared test fixture
//!
//! Wires up an isolated bus, state store, service registry (with the real
//! scene services), and file-backed registries in a temp directory.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use asc_area_scenes::{setup_with_timings, AreaScenes, SelectTimings};
use asc_components::register_scene_services;
use asc_core::Context;
use asc_event_bus::EventBus;
use asc_registries::{AreaEntry, AreaRegistry, EntityEntry, EntityRegistry, Storage};
use asc_service_registry::ServiceRegistry;
use asc_state_store::StateStore;

/// Capture log output per test; RUST_LOG controls verbosity
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Short delays so tests exercise the full reset/guard cycle quickly
pub fn fast_timings() -> SelectTimings {
    SelectTimings::new(Duration::from_millis(40), Duration::from_millis(80))
}

/// Wait long enough for spawned event listeners to drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Wait out the activation guard window of [`fast_timings`]
pub async fn settle_guard() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

pub struct TestHarness {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub areas: Arc<AreaRegistry>,
    pub entities: Arc<EntityRegistry>,
    _config_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();
        let config_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(Arc::clone(&bus)));
        let services = Arc::new(ServiceRegistry::new());
        register_scene_services(&services, Arc::clone(&states));

        let storage = Arc::new(Storage::new(config_dir.path()));
        let areas = Arc::new(AreaRegistry::new(Arc::clone(&storage), Arc::clone(&bus)));
        let entities = Arc::new(EntityRegistry::new(storage, Arc::clone(&bus)));

        Self {
            bus,
            states,
            services,
            areas,
            entities,
            _config_dir: config_dir,
        }
    }

    /// Run the integration against this harness with fast timings
    pub async fn setup(&self, options: serde_json::Value) -> AreaScenes {
        setup_with_timings(
            Arc::clone(&self.bus),
            Arc::clone(&self.states),
            Arc::clone(&self.services),
            Arc::clone(&self.areas),
            Arc::clone(&self.entities),
            &options,
            fast_timings(),
        )
        .await
        .expect("Setup failed")
    }

    pub fn add_area(&self, name: &str) -> Arc<AreaEntry> {
        self.areas.create(name)
    }

    /// Register a scene entity in an area and seed its state
    pub fn add_scene(
        &self,
        area_id: &str,
        object_id: &str,
        name: Option<&str>,
    ) -> Arc<EntityEntry> {
        let entity_id = format!("scene.{object_id}");
        self.entities
            .get_or_create(&entity_id, "scene")
            .expect("Invalid scene entity id");
        let entry = self
            .entities
            .update(&entity_id, |e| {
                e.area_id = Some(area_id.to_string());
                e.original_name = name.map(str::to_string);
            })
            .expect("Scene entity vanished");

        // Seed the state so later activations have a previous side
        self.states.set(
            entity_id.parse().expect("Invalid entity id"),
            "2026-01-01T00:00:00.000000Z",
            Default::default(),
            Context::new(),
        );
        entry
    }

    /// Activate a scene the way anything outside the selectors would
    pub async fn activate_scene(&self, entity_id: &str) {
        self.services
            .call(
                "scene",
                "turn_on",
                json!({ "entity_id": entity_id }),
                Context::new(),
            )
            .await
            .expect("scene.turn_on failed");
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get_state(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }
}
