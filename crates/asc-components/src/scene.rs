//! Scene component
//!
//! Scenes are stateless targets: "activating" one means asking its platform
//! to apply a pre-defined group state to devices. The entity's own state is
//! the timestamp of its last activation, so every `scene.turn_on` produces a
//! real state transition observable on the bus.

use asc_core::{Context, EntityId, ServiceCall, SCENE_DOMAIN};
use asc_service_registry::ServiceRegistry;
use asc_state_store::StateStore;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Register scene services
pub fn register_scene_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    services.register(SCENE_DOMAIN, "turn_on", move |call: ServiceCall| {
        let states = states.clone();
        async move {
            for entity_id in get_target_entities(&call, SCENE_DOMAIN) {
                activate_scene(&states, entity_id, call.context.clone());
            }
            Ok(())
        }
    });

    info!("Scene services registered");
}

/// Stamp a scene entity's state with the activation time
fn activate_scene(states: &StateStore, entity_id: EntityId, context: Context) {
    let attributes = states
        .get(&entity_id.to_string())
        .map(|s| s.attributes)
        .unwrap_or_default();

    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    debug!(entity_id = %entity_id, "Activating scene");
    states.set(entity_id, stamp, attributes, context);
}

/// Extract target entity ids of the given domain from a service call
fn get_target_entities(call: &ServiceCall, domain: &str) -> Vec<EntityId> {
    call.entity_ids()
        .iter()
        .filter_map(|id| id.parse::<EntityId>().ok())
        .filter(|e| e.domain() == domain)
        .collect()
}
