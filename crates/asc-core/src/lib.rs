//! Core types for the area-scenes platform
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: EntityId, State, Event, Context, and ServiceCall.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::State;

/// Domain tag for scene entities
pub const SCENE_DOMAIN: &str = "scene";

/// Domain tag for select entities
pub const SELECT_DOMAIN: &str = "select";

/// State value for an entity whose value is not known
pub const STATE_UNKNOWN: &str = "unknown";

/// State value for an entity whose backing topology disappeared
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Well-known event types and their payloads
pub mod events {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for area-registry mutations
    pub const AREA_REGISTRY_UPDATED: &str = "area_registry_updated";

    /// Event type for entity-registry mutations
    pub const ENTITY_REGISTRY_UPDATED: &str = "entity_registry_updated";

    /// What happened to a registry entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RegistryAction {
        Create,
        Update,
        Remove,
    }

    /// Data for STATE_CHANGED events
    ///
    /// `old_state` is None when the entity first appears; `new_state` is None
    /// when it is removed.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for AREA_REGISTRY_UPDATED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AreaRegistryUpdatedData {
        pub action: RegistryAction,
        pub area_id: String,
    }

    impl EventData for AreaRegistryUpdatedData {
        fn event_type() -> &'static str {
            AREA_REGISTRY_UPDATED
        }
    }

    /// Data for ENTITY_REGISTRY_UPDATED events
    ///
    /// Carries only the entity id; consumers that care about the entity's
    /// domain must look it up in the entity registry (and for Remove actions
    /// the lookup will fail).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EntityRegistryUpdatedData {
        pub action: RegistryAction,
        pub entity_id: String,
    }

    impl EventData for EntityRegistryUpdatedData {
        fn event_type() -> &'static str {
            ENTITY_REGISTRY_UPDATED
        }
    }
}
