//! Placement, settlement, refunds and timeouts on single-sandbox markets.

use arena_betting::entity::SandboxStatus;
use arena_betting::market::{Outcome, Resolution, Side};
use arena_betting::BettingError;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use super::{engine, money_in_system, sandbox, user};

#[test]
fn late_bet_is_rejected_and_closes_window() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.update_progress(&sbx.id, dec!(50)).unwrap();

    let err = engine
        .place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(10), 81_000)
        .unwrap_err();
    assert!(matches!(err, BettingError::MarketClosed { kind: "sandbox" }));
    assert!(!engine.get_odds(&sbx.id).unwrap().open);
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(100));
}

#[test]
fn bet_within_window_is_accepted() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.update_progress(&sbx.id, dec!(50)).unwrap();

    let bet = engine
        .place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(10), 79_000)
        .unwrap();
    assert_eq!(bet.stake, dec!(10));

    let odds = engine.get_odds(&sbx.id).unwrap();
    assert!(odds.open);
    assert_eq!(odds.total_pool, dec!(10));
}

#[test]
fn near_goal_closes_window() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.update_progress(&sbx.id, dec!(90)).unwrap();

    let err = engine
        .place_bet_at(&sbx.id, &alice.id, Side::No, dec!(10), 1_000)
        .unwrap_err();
    assert_eq!(err.to_string(), "Betting is closed for this sandbox");
}

#[test]
fn insufficient_balance_leaves_state_untouched() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(5));

    let err = engine
        .place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(10), 1_000)
        .unwrap_err();
    assert_eq!(err.to_string(), "Insufficient balance");

    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(5));
    let odds = engine.get_odds(&sbx.id).unwrap();
    assert_eq!(odds.total_pool, dec!(0));
    assert!(engine.bets_for_entity(&sbx.id).unwrap().is_empty());
}

#[test]
fn simple_settlement_pays_winner() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    engine
        .place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(60), 1_000)
        .unwrap();
    engine
        .place_bet_at(&sbx.id, &bob.id, Side::No, dec!(40), 2_000)
        .unwrap();

    let summary = engine.settle(&sbx.id, Side::Yes).unwrap();
    assert_eq!(summary.platform_take, dec!(5));
    assert_eq!(summary.paid_out, dec!(95));

    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(135));
    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(60));
    assert_eq!(engine.get_sandbox(&sbx.id).unwrap().agent_earnings, dec!(5));

    let bets = engine.bets_for_user(&alice.id).unwrap();
    assert!(bets[0].settled);
    assert_eq!(bets[0].payout, Some(dec!(95)));
}

#[test]
fn proportional_split_between_winners() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));
    let carol = user(&engine, "carol", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(30), 1).unwrap();
    engine.place_bet_at(&sbx.id, &bob.id, Side::Yes, dec!(30), 2).unwrap();
    engine.place_bet_at(&sbx.id, &carol.id, Side::No, dec!(40), 3).unwrap();

    engine.settle(&sbx.id, Side::Yes).unwrap();

    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(117.50));
    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(117.50));
    assert_eq!(engine.get_user(&carol.id).unwrap().balance, dec!(60));
}

#[test]
fn settlement_is_idempotent() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(20), 1).unwrap();

    let first = engine.settle(&sbx.id, Side::Yes).unwrap();
    let second = engine.settle(&sbx.id, Side::No).unwrap();

    assert!(!first.already_resolved);
    assert!(second.already_resolved);
    assert_eq!(second.resolution, Resolution::Yes);
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(99));

    let refund = engine.refund(&sbx.id).unwrap();
    assert!(refund.already_resolved);
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(99));
}

#[test]
fn money_is_conserved_across_settlement() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));
    let carol = user(&engine, "carol", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(1), 1).unwrap();
    engine.place_bet_at(&sbx.id, &bob.id, Side::Yes, dec!(1), 2).unwrap();
    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(1), 3).unwrap();
    engine.place_bet_at(&sbx.id, &carol.id, Side::No, dec!(7), 4).unwrap();

    let users = [&alice, &bob, &carol];
    let before = money_in_system(&engine, &users, &[&sbx.id]);

    let summary = engine.settle(&sbx.id, Side::Yes).unwrap();
    assert!(summary.paid_out <= summary.total_pool - summary.platform_take);

    let after = money_in_system(&engine, &users, &[&sbx.id]);
    assert_eq!(before, after);
}

#[test]
fn empty_winning_side_leaves_pool_unallocated() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(50), 1).unwrap();

    let summary = engine.settle(&sbx.id, Side::No).unwrap();
    assert_eq!(summary.paid_out, dec!(0));
    assert_eq!(summary.unallocated, dec!(47.5));

    let market = engine.get_market(&sbx.id).unwrap().unwrap();
    assert_eq!(market.unallocated, Some(dec!(47.5)));
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(50));
}

#[test]
fn refund_returns_every_stake() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(25), 1).unwrap();
    engine.place_bet_at(&sbx.id, &bob.id, Side::No, dec!(15.5), 2).unwrap();

    let summary = engine.refund(&sbx.id).unwrap();
    assert_eq!(summary.resolution, Resolution::Refunded);
    assert_eq!(summary.paid_out, dec!(40.5));
    assert_eq!(summary.platform_take, dec!(0));

    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(100));
    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(100));
    assert_eq!(engine.get_sandbox(&sbx.id).unwrap().agent_earnings, dec!(0));
}

#[test]
fn timeout_fails_sandbox_and_settles_for_no() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    engine.activate_sandbox(&sbx.id).unwrap();
    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(50), 1).unwrap();
    engine.place_bet_at(&sbx.id, &bob.id, Side::No, dec!(50), 2).unwrap();

    let early = engine.auto_settle_expired_at(99_999).unwrap();
    assert!(early.affected.is_empty());

    let report = engine.auto_settle_expired_at(100_000).unwrap();
    assert_eq!(report.affected, vec![sbx.id.clone()]);
    assert!(report.failures.is_empty());

    assert_eq!(engine.get_sandbox(&sbx.id).unwrap().status, SandboxStatus::Failed);
    assert_eq!(engine.get_user(&bob.id).unwrap().balance, dec!(145));
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(50));

    let again = engine.auto_settle_expired_at(200_000).unwrap();
    assert_eq!(again.examined, 0);
}

#[test]
fn completed_sandbox_is_skipped_by_timeout_sweep() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(10), 1).unwrap();
    let (done, settlement) = engine.complete_sandbox(&sbx.id, Outcome::Success).unwrap();
    assert_eq!(done.status, SandboxStatus::Completed);
    assert_eq!(settlement.unwrap().resolution, Resolution::Yes);

    let report = engine.auto_settle_expired_at(500_000).unwrap();
    assert!(report.affected.is_empty());
    assert_eq!(engine.get_user(&alice.id).unwrap().balance, dec!(99.5));
}

#[test]
fn odds_track_the_pool() {
    let engine = engine();
    let sbx = sandbox(&engine);
    let alice = user(&engine, "alice", dec!(100));
    let bob = user(&engine, "bob", dec!(100));

    let neutral = engine.get_odds(&sbx.id).unwrap();
    assert_eq!(neutral.prob_yes, dec!(0.5));
    assert!(neutral.open);

    engine.place_bet_at(&sbx.id, &alice.id, Side::Yes, dec!(60), 1).unwrap();
    let bet = engine.place_bet_at(&sbx.id, &bob.id, Side::No, dec!(40), 2).unwrap();
    assert_eq!(bet.odds_at_placement, dec!(2.5));

    let odds = engine.get_odds(&sbx.id).unwrap();
    assert_eq!(odds.prob_yes + odds.prob_no, dec!(1));
    assert_eq!(odds.multiplier_no, dec!(2.5));
}
