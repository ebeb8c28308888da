//! File-backed databases.

use std::time::Duration;

use arena_betting::entity::NewSandbox;
use arena_betting::market::Side;
use arena_betting::store::ArenaStore;
use arena_betting::{ArenaError, Config, Engine};
use rust_decimal_macros::dec;

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arena.db");
    let path = path.to_str().unwrap().to_string();

    let (sandbox_id, user_id) = {
        let store = ArenaStore::open(&path, Duration::from_millis(500)).unwrap();
        let engine = Engine::new(store, dec!(1000));
        let sandbox = engine
            .create_sandbox(&NewSandbox {
                goal_description: "Publish a blog post".to_string(),
                goal_type: "custom".to_string(),
                model: "model-a".to_string(),
                target_value: dec!(1),
                time_limit_secs: 3600,
            })
            .unwrap();
        let user = engine.create_user("dana", "dana@example.com").unwrap();
        engine
            .place_bet(&sandbox.id, &user.id, Side::Yes, dec!(12.34))
            .unwrap();
        (sandbox.id, user.id)
    };

    let config = Config {
        database_path: path,
        ..Config::default()
    };
    let engine = Engine::from_config(&config).unwrap();

    assert_eq!(engine.get_user(&user_id).unwrap().balance, dec!(987.66));
    let odds = engine.get_odds(&sandbox_id).unwrap();
    assert_eq!(odds.total_pool, dec!(12.34));
    assert_eq!(engine.bets_for_entity(&sandbox_id).unwrap().len(), 1);
}

#[test]
fn two_handles_on_one_file_see_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let path = path.to_str().unwrap();

    let first = Engine::new(
        ArenaStore::open(path, Duration::from_millis(2_000)).unwrap(),
        dec!(1000),
    );
    let second = Engine::new(
        ArenaStore::open(path, Duration::from_millis(2_000)).unwrap(),
        dec!(1000),
    );

    let user = first.create_user("eve", "eve@example.com").unwrap();
    second.withdraw(&user.id, dec!(600)).unwrap();

    let err = first.withdraw(&user.id, dec!(500)).unwrap_err();
    assert_eq!(err.to_string(), "Insufficient balance");
    assert_eq!(first.get_user(&user.id).unwrap().balance, dec!(400));
}

#[test]
fn unopenable_database_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("arena.db");
    let config = Config {
        database_path: path.to_str().unwrap().to_string(),
        ..Config::default()
    };

    let err = Engine::from_config(&config).unwrap_err();
    assert!(matches!(err, ArenaError::Store(_)));
}
