//! Selector lifecycle against registry topology changes
//!
//! One selector per area with at least one scene; selectors appear when an
//! area gains its first scene and are torn down when the area loses its
//! last scene or disappears.

mod common;

use serde_json::json;

use common::{settle, TestHarness};

#[tokio::test]
async fn test_selector_per_scened_area() {
    let harness = TestHarness::new();
    let living_room = harness.add_area("Living Room");
    let garage = harness.add_area("Garage");
    harness.add_scene(&living_room.id, "movie_night", Some("Movie Night"));
    harness.add_scene(&living_room.id, "bright", Some("Bright"));

    let integration = harness.setup(json!({})).await;

    assert_eq!(integration.manager().len(), 1);
    let select = integration
        .manager()
        .get(&living_room.id)
        .expect("No selector for Living Room");
    assert_eq!(select.entity_id().to_string(), "select.living_room_scenes");
    // Scene lists order by registry id, which follows registration order
    assert_eq!(select.options(), vec!["Movie Night", "Bright"]);
    harness.assert_state("select.living_room_scenes", "unknown");

    // The sceneless area gets no selector
    assert!(integration.manager().get(&garage.id).is_none());

    integration.shutdown();
}

#[tokio::test]
async fn test_selector_state_attributes() {
    let harness = TestHarness::new();
    let area = harness.add_area("Office");
    harness.add_scene(&area.id, "focus", Some("Focus"));

    let integration = harness.setup(json!({})).await;

    let state = harness
        .states
        .get("select.office_scenes")
        .expect("Selector state missing");
    assert_eq!(state.attributes["friendly_name"], json!("Office Scenes"));
    assert_eq!(state.attributes["icon"], json!("mdi:palette-outline"));
    assert_eq!(state.attributes["area_id"], json!(area.id));
    assert_eq!(state.attributes["options"], json!(["Focus"]));
    assert_eq!(state.attributes["scene_entities"], json!(["scene.focus"]));
    assert_eq!(state.attributes["reset_mode"], json!(false));

    integration.shutdown();
}

#[tokio::test]
async fn test_selector_appears_when_first_scene_added() {
    let harness = TestHarness::new();
    let area = harness.add_area("Bedroom");

    let integration = harness.setup(json!({})).await;
    assert!(integration.manager().is_empty());

    harness.add_scene(&area.id, "night", Some("Night"));
    settle().await;

    let select = integration
        .manager()
        .get(&area.id)
        .expect("Selector not created after first scene");
    assert_eq!(select.options(), vec!["Night"]);
    harness.assert_state("select.bedroom_scenes", "unknown");

    integration.shutdown();
}

#[tokio::test]
async fn test_selector_torn_down_when_last_scene_removed() {
    let harness = TestHarness::new();
    let area = harness.add_area("Bedroom");
    harness.add_scene(&area.id, "night", Some("Night"));

    let integration = harness.setup(json!({})).await;
    assert_eq!(integration.manager().len(), 1);

    harness.entities.remove("scene.night");
    settle().await;

    assert!(integration.manager().get(&area.id).is_none());
    assert!(harness.get_state("select.bedroom_scenes").is_none());

    integration.shutdown();
}

#[tokio::test]
async fn test_selector_torn_down_when_area_removed() {
    let harness = TestHarness::new();
    let area = harness.add_area("Guest Room");
    harness.add_scene(&area.id, "cozy", Some("Cozy"));

    let integration = harness.setup(json!({})).await;
    assert_eq!(integration.manager().len(), 1);

    harness.areas.remove(&area.id);
    settle().await;

    assert!(integration.manager().is_empty());
    assert!(harness.get_state("select.guest_room_scenes").is_none());

    integration.shutdown();
}

#[tokio::test]
async fn test_options_follow_scene_rename() {
    let harness = TestHarness::new();
    let area = harness.add_area("Den");
    harness.add_scene(&area.id, "movie", Some("Movie"));
    harness.add_scene(&area.id, "game", Some("Game"));

    let integration = harness.setup(json!({})).await;
    let select = integration.manager().get(&area.id).unwrap();

    harness
        .entities
        .update("scene.movie", |e| e.name = Some("Cinema".to_string()))
        .unwrap();
    settle().await;

    let mut options = select.options();
    options.sort();
    assert_eq!(options, vec!["Cinema", "Game"]);

    integration.shutdown();
}

#[tokio::test]
async fn test_scene_moving_between_areas() {
    let harness = TestHarness::new();
    let den = harness.add_area("Den");
    let attic = harness.add_area("Attic");
    harness.add_scene(&den.id, "reading", Some("Reading"));

    let integration = harness.setup(json!({})).await;
    assert_eq!(integration.manager().len(), 1);

    harness
        .entities
        .update("scene.reading", |e| e.area_id = Some(attic.id.clone()))
        .unwrap();
    settle().await;

    // Selector followed the scene's only area
    assert!(integration.manager().get(&den.id).is_none());
    assert!(harness.get_state("select.den_scenes").is_none());
    let select = integration
        .manager()
        .get(&attic.id)
        .expect("No selector for Attic");
    assert_eq!(select.options(), vec!["Reading"]);

    integration.shutdown();
}

#[tokio::test]
async fn test_customized_selector() {
    let harness = TestHarness::new();
    let area = harness.add_area("Living Room");
    harness.add_scene(&area.id, "movie_night", Some("Movie Night"));

    let mut customize = serde_json::Map::new();
    customize.insert(
        area.id.clone(),
        json!({
            "name": "Ambiance",
            "icon": "mdi:lightbulb-group",
            "color": "#ffaa00",
            "reset_mode": true
        }),
    );
    let options = json!({ "customize": customize });
    let integration = harness.setup(options).await;

    let select = integration.manager().get(&area.id).unwrap();
    // Reset option is appended and is the initial state
    assert_eq!(select.options(), vec!["Movie Night", "None"]);
    harness.assert_state("select.living_room_scenes", "None");

    let state = harness.states.get("select.living_room_scenes").unwrap();
    assert_eq!(state.attributes["friendly_name"], json!("Ambiance"));
    assert_eq!(state.attributes["icon"], json!("mdi:lightbulb-group"));
    assert_eq!(state.attributes["color"], json!("#ffaa00"));
    assert_eq!(state.attributes["reset_mode"], json!(true));

    integration.shutdown();
}

#[tokio::test]
async fn test_shutdown_removes_all_selectors() {
    let harness = TestHarness::new();
    let a = harness.add_area("A Room");
    let b = harness.add_area("B Room");
    harness.add_scene(&a.id, "a1", None);
    harness.add_scene(&b.id, "b1", None);

    let integration = harness.setup(json!({})).await;
    assert_eq!(integration.manager().len(), 2);

    integration.shutdown();

    assert!(harness.get_state("select.a_room_scenes").is_none());
    assert!(harness.get_state("select.b_room_scenes").is_none());

    // Later registry changes must not resurrect anything
    harness.add_scene(&a.id, "a2", None);
    settle().await;
    assert!(integration.manager().is_empty());
}
