//! Head-to-head challenges.

use arena_betting::entity::{ChallengeStatus, NewChallenge, SandboxStatus};
use arena_betting::market::{MarketKind, Outcome, Resolution, Side};
use arena_betting::BettingError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::{engine, user};

fn new_challenge() -> NewChallenge {
    NewChallenge {
        goal_description: "First $10 of revenue".to_string(),
        goal_type: "revenue".to_string(),
        target_value: dec!(10),
        time_limit_secs: 600,
        model_a: "model-a".to_string(),
        model_b: "model-b".to_string(),
    }
}

#[test]
fn challenge_market_stays_open_until_both_agents_finish() {
    let engine = engine();
    let challenge = engine.create_challenge_at(&new_challenge(), 0).unwrap();
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    let market = engine.get_market(&challenge.id).unwrap().unwrap();
    assert_eq!(market.kind, MarketKind::Challenge);

    // No time-based early close for challenges.
    engine
        .place_bet_at(&challenge.id, &alice.id, Side::Yes, dec!(30), 590_000)
        .unwrap();

    engine
        .complete_sandbox(&challenge.sandbox_a, Outcome::Success)
        .unwrap();
    engine
        .place_bet_at(&challenge.id, &bob.id, Side::No, dec!(20), 591_000)
        .unwrap();

    engine.stop_sandbox(&challenge.sandbox_b).unwrap();
    let err = engine
        .place_bet_at(&challenge.id, &bob.id, Side::No, dec!(5), 592_000)
        .unwrap_err();
    assert!(matches!(err, BettingError::MarketClosed { kind: "challenge" }));
}

#[test]
fn settling_a_challenge_pays_the_backers_of_the_winner() {
    let engine = engine();
    let challenge = engine.create_challenge_at(&new_challenge(), 0).unwrap();
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    engine.place_bet_at(&challenge.id, &alice.id, Side::Yes, dec!(10), 1).unwrap();
    engine.place_bet_at(&challenge.id, &bob.id, Side::No, dec!(30), 2).unwrap();

    let summary = engine.settle(&challenge.id, Side::No).unwrap();
    assert_eq!(summary.resolution, Resolution::No);
    assert_eq!(summary.platform_take, dec!(2));

    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(108));
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(90));
    assert_eq!(
        engine.get_challenge(&challenge.id).unwrap().status,
        ChallengeStatus::Completed
    );
    // Challenge takes are not credited to either agent.
    assert_eq!(
        engine.get_sandbox(&challenge.sandbox_a).unwrap().agent_earnings,
        dec!(0)
    );
}

#[test]
fn agent_sandboxes_time_out_without_touching_the_challenge_market() {
    let engine = engine();
    let challenge = engine.create_challenge_at(&new_challenge(), 0).unwrap();
    let alice = user(&engine, "alice", dec!(100));

    engine.place_bet_at(&challenge.id, &alice.id, Side::Yes, dec!(10), 1).unwrap();

    let report = engine.auto_settle_expired_at(600_000).unwrap();
    assert_eq!(report.affected.len(), 2);
    assert!(report.failures.is_empty());

    assert_eq!(
        engine.get_sandbox(&challenge.sandbox_b).unwrap().status,
        SandboxStatus::Failed
    );
    let market = engine.get_market(&challenge.id).unwrap().unwrap();
    assert!(market.resolution.is_none());

    let closed = engine.close_due_markets_at(600_001).unwrap();
    assert_eq!(closed.affected, vec![challenge.id.clone()]);

    engine.refund(&challenge.id).unwrap();
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(100));
}
