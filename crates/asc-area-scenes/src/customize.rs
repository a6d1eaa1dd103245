//! Per-area customization
//!
//! The host's options store persists a `customize` object keyed by area id;
//! this module is the read-only view of it. Missing areas and unknown keys
//! deserialize to defaults, since the options blob is user-edited.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Optional per-area overrides for a scene selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customization {
    /// Override for the selector's display name
    #[serde(default)]
    pub name: Option<String>,

    /// Override for the selector's icon
    #[serde(default)]
    pub icon: Option<String>,

    /// Accent color, passed through as an attribute
    #[serde(default)]
    pub color: Option<String>,

    /// When set, selections are momentary: the selector snaps back to the
    /// reset option shortly after activating a scene.
    #[serde(default)]
    pub reset_mode: bool,
}

/// Customizations keyed by area id
pub type CustomizeMap = HashMap<String, Customization>;

/// Extract per-area customizations from an options blob
///
/// The expected shape is `{"customize": {"<area_id>": {...}, ...}}`. An
/// absent or malformed `customize` object yields an empty map.
pub fn customize_from_options(options: &serde_json::Value) -> CustomizeMap {
    match options.get("customize") {
        None => CustomizeMap::new(),
        Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|err| {
            warn!("Ignoring malformed customize options: {}", err);
            CustomizeMap::new()
        }),
    }
}
