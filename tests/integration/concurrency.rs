//! Racing writers against one balance.

use std::thread;
use std::time::Duration;

use arena_betting::entity::NewSandbox;
use arena_betting::market::Side;
use arena_betting::store::ArenaStore;
use arena_betting::{BettingError, Engine};
use rust_decimal_macros::dec;

const RACERS: usize = 8;

fn count_outcomes(results: Vec<Result<(), BettingError>>) -> usize {
    let mut accepted = 0;
    for result in results {
        match result {
            Ok(()) => accepted += 1,
            Err(err) => assert!(
                matches!(err, BettingError::InsufficientBalance { .. }),
                "unexpected error: {err}"
            ),
        }
    }
    accepted
}

fn open_sandbox(engine: &Engine) -> String {
    engine
        .create_sandbox(&NewSandbox {
            goal_description: "Ship a landing page".to_string(),
            goal_type: "custom".to_string(),
            model: "model-a".to_string(),
            target_value: dec!(1),
            time_limit_secs: 3600,
        })
        .unwrap()
        .id
}

#[test]
fn racing_bets_on_shared_engine_never_overdraw() {
    let engine = Engine::new(ArenaStore::open_in_memory().unwrap(), dec!(1000));
    let sandbox_id = open_sandbox(&engine);
    let user = engine.create_user("frank", "frank@example.com").unwrap();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let engine = engine.clone();
                let (sandbox_id, user_id) = (&sandbox_id, &user.id);
                let side = if i % 2 == 0 { Side::Yes } else { Side::No };
                scope.spawn(move || {
                    engine
                        .place_bet(sandbox_id, user_id, side, dec!(300))
                        .map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(count_outcomes(results), 3);
    assert_eq!(engine.get_user(&user.id).unwrap().balance, dec!(100));
    assert_eq!(engine.get_odds(&sandbox_id).unwrap().total_pool, dec!(900));
}

#[test]
fn racing_bets_across_handles_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let path = path.to_str().unwrap();

    // Handles are opened up front so schema setup does not race.
    let engines: Vec<Engine> = (0..RACERS)
        .map(|_| {
            Engine::new(
                ArenaStore::open(path, Duration::from_secs(10)).unwrap(),
                dec!(1000),
            )
        })
        .collect();
    let sandbox_id = open_sandbox(&engines[0]);
    let user = engines[0].create_user("grace", "grace@example.com").unwrap();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = engines
            .iter()
            .map(|engine| {
                let (sandbox_id, user_id) = (&sandbox_id, &user.id);
                scope.spawn(move || {
                    engine
                        .place_bet(sandbox_id, user_id, Side::Yes, dec!(300))
                        .map(|_| ())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(count_outcomes(results), 3);
    let balance = engines[1].get_user(&user.id).unwrap().balance;
    assert_eq!(balance, dec!(100));
    assert!(balance >= dec!(0));
    assert_eq!(engines[1].get_odds(&sandbox_id).unwrap().total_pool, dec!(900));
}
