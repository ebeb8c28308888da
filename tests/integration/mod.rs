//! Integration tests for the betting engine.
//!
//! Every test runs against a private in-memory database, except the
//! persistence tests which use a temporary file.

mod betting_flow;
mod challenge_flow;
mod concurrency;
mod persistence;
mod sweeps;

use arena_betting::entity::{NewSandbox, Sandbox};
use arena_betting::ledger::User;
use arena_betting::store::ArenaStore;
use arena_betting::Engine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fresh engine with the default starting balance.
pub fn engine() -> Engine {
    Engine::new(ArenaStore::open_in_memory().unwrap(), dec!(1000))
}

/// Sandbox created at t=0 with a 100 s budget and a target of 100.
pub fn sandbox(engine: &Engine) -> Sandbox {
    engine
        .create_sandbox_at(
            &NewSandbox {
                goal_description: "Reach 100 followers".to_string(),
                goal_type: "followers".to_string(),
                model: "model-a".to_string(),
                target_value: dec!(100),
                time_limit_secs: 100,
            },
            0,
        )
        .unwrap()
}

/// User with exactly `balance`.
pub fn user(engine: &Engine, name: &str, balance: Decimal) -> User {
    let user = engine
        .create_user(name, &format!("{name}@example.com"))
        .unwrap();
    let diff = balance - user.balance;
    if diff > Decimal::ZERO {
        engine.deposit(&user.id, diff).unwrap();
    } else if diff < Decimal::ZERO {
        engine.withdraw(&user.id, -diff).unwrap();
    }
    engine.get_user(&user.id).unwrap()
}

/// Sum of all balances plus every unresolved pool, platform takes and unallocated amounts.
pub fn money_in_system(engine: &Engine, users: &[&User], markets: &[&str]) -> Decimal {
    let balances: Decimal = users
        .iter()
        .map(|u| engine.get_user(&u.id).unwrap().balance)
        .sum();
    let held: Decimal = markets
        .iter()
        .map(|id| {
            let market = engine.get_market(id).unwrap().unwrap();
            match market.resolution {
                None => market.total_pool(),
                Some(_) => {
                    market.platform_take.unwrap_or_default() + market.unallocated.unwrap_or_default()
                }
            }
        })
        .sum();
    balances + held
}
