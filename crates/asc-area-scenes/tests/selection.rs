//! Selection behavior: activation, reset mode, and state reconciliation

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use asc_area_scenes::{AreaScenes, SceneSelectedData, RESET_OPTION};

use common::{settle, settle_guard, TestHarness};

async fn setup_living_room(harness: &TestHarness, reset_mode: bool) -> (AreaScenes, String) {
    let area = harness.add_area("Living Room");
    harness.add_scene(&area.id, "movie_night", Some("Movie Night"));
    harness.add_scene(&area.id, "bright", Some("Bright"));

    let mut customize = serde_json::Map::new();
    customize.insert(area.id.clone(), json!({ "reset_mode": reset_mode }));
    let integration = harness
        .setup(json!({ "customize": customize }))
        .await;
    (integration, area.id.clone())
}

#[tokio::test]
async fn test_select_activates_scene() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();

    let mut events = harness.bus.subscribe_typed::<SceneSelectedData>();
    let scene_before = harness.get_state("scene.movie_night").unwrap();

    select.select_option("Movie Night").await.unwrap();

    harness.assert_state("select.living_room_scenes", "Movie Night");

    // The scene was activated: its timestamp state moved forward
    let scene_after = harness.get_state("scene.movie_night").unwrap();
    assert_ne!(scene_before, scene_after);

    let event = timeout(Duration::from_millis(100), events.recv())
        .await
        .expect("No scene_selected event")
        .unwrap();
    assert_eq!(event.data.area_id, area_id);
    assert_eq!(event.data.scene_name, "Movie Night");
    assert_eq!(event.data.scene_entity_id, "scene.movie_night");

    integration.shutdown();
}

#[tokio::test]
async fn test_reselecting_current_option_is_noop() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();

    let mut events = harness.bus.subscribe_typed::<SceneSelectedData>();

    select.select_option("Bright").await.unwrap();
    settle_guard().await;
    select.select_option("Bright").await.unwrap();

    // Exactly one activation announced
    timeout(Duration::from_millis(100), events.recv())
        .await
        .expect("No scene_selected event")
        .unwrap();
    assert!(
        timeout(Duration::from_millis(100), events.recv())
            .await
            .is_err(),
        "Re-selecting the current option activated the scene again"
    );

    integration.shutdown();
}

#[tokio::test]
async fn test_unknown_option_is_displayed_but_not_activated() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();

    let mut events = harness.bus.subscribe_typed::<SceneSelectedData>();

    select.select_option("Disco").await.unwrap();

    harness.assert_state("select.living_room_scenes", "Disco");
    assert!(
        timeout(Duration::from_millis(100), events.recv())
            .await
            .is_err(),
        "Unknown option fired an activation"
    );

    integration.shutdown();
}

#[tokio::test]
async fn test_reset_mode_snaps_back() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, true).await;
    let select = integration.manager().get(&area_id).unwrap();

    harness.assert_state("select.living_room_scenes", RESET_OPTION);

    select.select_option("Movie Night").await.unwrap();
    // Shown immediately, then snapped back after the reset delay
    harness.assert_state("select.living_room_scenes", "Movie Night");
    settle_guard().await;
    harness.assert_state("select.living_room_scenes", RESET_OPTION);

    // The activation echo within the guard window must not have stuck
    let scene_before = harness.get_state("scene.movie_night").unwrap();
    assert_ne!(scene_before, "2026-01-01T00:00:00.000000Z");

    integration.shutdown();
}

#[tokio::test]
async fn test_guard_suppresses_late_echo() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, true).await;
    let select = integration.manager().get(&area_id).unwrap();

    select.select_option("Bright").await.unwrap();
    // A scene state change landing right after the call is the activation
    // echoing back; it must not overwrite the snap-back
    harness.activate_scene("scene.bright").await;
    settle_guard().await;

    harness.assert_state("select.living_room_scenes", RESET_OPTION);

    integration.shutdown();
}

#[tokio::test]
async fn test_external_activation_updates_selector() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();
    assert_eq!(select.current_option(), None);

    harness.activate_scene("scene.bright").await;
    settle().await;

    harness.assert_state("select.living_room_scenes", "Bright");
    assert_eq!(select.current_option().as_deref(), Some("Bright"));

    integration.shutdown();
}

#[tokio::test]
async fn test_external_activation_of_other_areas_ignored() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let other = harness.add_area("Kitchen");
    harness.add_scene(&other.id, "cooking", Some("Cooking"));
    settle().await;

    harness.activate_scene("scene.cooking").await;
    settle().await;

    // Kitchen's selector follows, Living Room's does not
    harness.assert_state("select.kitchen_scenes", "Cooking");
    harness.assert_state("select.living_room_scenes", "unknown");
    let select = integration.manager().get(&area_id).unwrap();
    assert_eq!(select.current_option(), None);

    integration.shutdown();
}

#[tokio::test]
async fn test_external_activation_after_guard_overrides_selection() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();

    select.select_option("Movie Night").await.unwrap();
    settle_guard().await;

    // Guard has elapsed; a new external activation wins
    harness.activate_scene("scene.bright").await;
    settle().await;

    harness.assert_state("select.living_room_scenes", "Bright");
    assert_eq!(select.current_option().as_deref(), Some("Bright"));

    integration.shutdown();
}

#[tokio::test]
async fn test_refresh_during_selection_keeps_display() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, false).await;
    let select = integration.manager().get(&area_id).unwrap();

    select.select_option("Movie Night").await.unwrap();

    // Topology changes while the activation guard is still up
    let kitchen = harness.add_area("Kitchen");
    harness.add_scene(&kitchen.id, "cooking", Some("Cooking"));
    settle().await;

    // The in-flight selection survived the snapshot replacement
    harness.assert_state("select.living_room_scenes", "Movie Night");
    assert_eq!(select.current_option().as_deref(), Some("Movie Night"));

    // And the new area's selector appeared alongside it
    let kitchen_select = integration
        .manager()
        .get(&kitchen.id)
        .expect("No selector for Kitchen");
    assert_eq!(kitchen_select.options(), vec!["Cooking"]);
    harness.assert_state("select.kitchen_scenes", "unknown");

    integration.shutdown();
}

#[tokio::test]
async fn test_reset_option_selectable_without_activation() {
    let harness = TestHarness::new();
    let (integration, area_id) = setup_living_room(&harness, true).await;
    let select = integration.manager().get(&area_id).unwrap();

    select.select_option("Movie Night").await.unwrap();
    settle_guard().await;

    let mut events = harness.bus.subscribe_typed::<SceneSelectedData>();
    select.select_option(RESET_OPTION).await.unwrap();
    harness.assert_state("select.living_room_scenes", RESET_OPTION);
    assert!(
        timeout(Duration::from_millis(100), events.recv())
            .await
            .is_err(),
        "Reset option fired an activation"
    );

    integration.shutdown();
}
