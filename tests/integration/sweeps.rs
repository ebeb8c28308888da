//! Background sweeps across several entities.

use arena_betting::entity::SandboxStatus;
use arena_betting::market::{Resolution, Side};
use arena_betting::BettingError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::{engine, sandbox, user};

#[test]
fn one_broken_sandbox_does_not_stop_the_timeout_sweep() {
    let engine = engine();
    let broken = sandbox(&engine);
    let healthy = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    engine
        .place_bet_at(&broken.id, &alice.id, Side::No, dec!(10), 1_000)
        .unwrap();
    engine
        .place_bet_at(&healthy.id, &bob.id, Side::No, dec!(20), 1_000)
        .unwrap();

    // Settling `broken` credits alice, whose balance row can no longer be decoded.
    engine
        .store()
        .write(|tx| {
            tx.execute(
                "UPDATE users SET balance = 'not-a-number' WHERE id = ?1",
                [&alice.id],
            )
            .map_err(BettingError::from)
        })
        .unwrap();

    let report = engine.auto_settle_expired_at(200_000).unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.affected, vec![healthy.id.clone()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity_id, broken.id);

    // The failed sandbox rolled back as a whole.
    assert_eq!(engine.get_sandbox(&broken.id).unwrap().status, SandboxStatus::Pending);
    assert_eq!(engine.get_market(&broken.id).unwrap().unwrap().resolution, None);

    assert_eq!(engine.get_sandbox(&healthy.id).unwrap().status, SandboxStatus::Failed);
    let market = engine.get_market(&healthy.id).unwrap().unwrap();
    assert_eq!(market.resolution, Some(Resolution::No));
    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(99));
}

#[test]
fn very_large_pool_settles_through_the_sweep() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let whale = user(&engine, "whale", dec!(1000000000000000));
    let minnow = user(&engine, "minnow", dec!(1));

    engine
        .place_bet_at(&sbx.id, &whale.id, Side::No, dec!(1000000000000000), 1_000)
        .unwrap();
    engine
        .place_bet_at(&sbx.id, &minnow.id, Side::Yes, dec!(1), 1_000)
        .unwrap();

    let report = engine.auto_settle_expired_at(200_000).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.affected, vec![sbx.id.clone()]);
    assert_eq!(
        engine.get_user(&whale.id).unwrap().balance,
        dec!(950000000000000.95)
    );
    assert_eq!(engine.get_user(&minnow.id).unwrap().balance, dec!(0));
}

#[test]
fn window_sweep_counts_each_close_once() {
    let engine = engine();
    let sbx = sandbox(&engine);

    let first = engine.close_due_markets_at(85_000).unwrap();
    assert_eq!(first.affected, vec![sbx.id.clone()]);

    let second = engine.close_due_markets_at(86_000).unwrap();
    assert_eq!(second.examined, 0);
    assert!(second.affected.is_empty());
}
