#![cfg(target_arch = "wasm32")]

use jungle_flip::{create_game_state, shuffled_deck, validate_state, GameEngine};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn engine_starts_and_renders() {
    let engine = GameEngine::new(None, Some("instant".to_string())).expect("engine builds");
    engine.start().expect("game starts");
    let view: serde_json::Value =
        serde_json::from_str(&engine.view_json().expect("view renders")).expect("view is json");
    assert_eq!(view["state"]["phase"], serde_json::json!("FirstTurnPending"));
    assert!(view["lifetime"].is_object());
}

#[wasm_bindgen_test]
fn dealt_state_passes_validation() {
    let state = create_game_state(Some(42)).expect("state deals");
    assert!(validate_state(state).is_ok());
}

#[wasm_bindgen_test]
fn seeded_deck_is_stable() {
    let first = shuffled_deck(9).expect("deck");
    let again = shuffled_deck(9).expect("deck");
    assert_eq!(
        serde_wasm_bindgen::from_value::<serde_json::Value>(first).expect("deck decodes"),
        serde_wasm_bindgen::from_value::<serde_json::Value>(again).expect("deck decodes")
    );
}

#[wasm_bindgen_test]
fn config_json_is_applied() {
    let engine = GameEngine::new(Some(r#"{"undo_credits":1}"#.to_string()), None)
        .expect("engine builds");
    engine.start().expect("game starts");
    let view: serde_json::Value =
        serde_json::from_str(&engine.view_json().expect("view renders")).expect("view is json");
    assert_eq!(view["undo_credits"]["red"], serde_json::json!(1));
}
