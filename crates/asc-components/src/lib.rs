//! Built-in components for the area-scenes platform
//!
//! Currently only the `scene` component, which provides the activation
//! service the per-area selectors call into.

mod scene;

pub use scene::register_scene_services;
