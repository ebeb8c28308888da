//! Sandbox and challenge registry operations.
//!
//! Every function runs inside the caller's transaction. Creating an entity
//! also opens its market, and finishing one settles it, so the pair never
//! drifts apart.

use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use super::types::{Challenge, ChallengeStatus, NewChallenge, NewSandbox, Sandbox, SandboxStatus};
use crate::betting::settlement::{self, SettlementSummary};
use crate::error::BettingError;
use crate::market::{Market, MarketKind, Outcome};
use crate::store::records;

/// Load a sandbox or fail with `NotFound`.
pub fn require_sandbox(conn: &Connection, id: &str) -> Result<Sandbox, BettingError> {
    records::get_sandbox(conn, id)?.ok_or_else(|| BettingError::not_found("sandbox", id))
}

/// Load a challenge or fail with `NotFound`.
pub fn require_challenge(conn: &Connection, id: &str) -> Result<Challenge, BettingError> {
    records::get_challenge(conn, id)?.ok_or_else(|| BettingError::not_found("challenge", id))
}

/// Check goal parameters and return the deadline (unix ms).
fn validate_goal(target_value: Decimal, time_limit_secs: i64, now: i64) -> Result<i64, BettingError> {
    if target_value <= Decimal::ZERO {
        return Err(BettingError::Invalid(format!(
            "target_value must be positive, got {target_value}"
        )));
    }
    if time_limit_secs <= 0 {
        return Err(BettingError::Invalid(format!(
            "time_limit_secs must be positive, got {time_limit_secs}"
        )));
    }
    time_limit_secs
        .checked_mul(1000)
        .and_then(|ms| now.checked_add(ms))
        .ok_or_else(|| {
            BettingError::Invalid(format!("time_limit_secs {time_limit_secs} is out of range"))
        })
}

fn build_sandbox(
    goal_description: &str,
    goal_type: &str,
    model: &str,
    target_value: Decimal,
    time_limit_secs: i64,
    now: i64,
    expires_at: i64,
) -> Sandbox {
    Sandbox {
        id: Uuid::new_v4().to_string(),
        goal_description: goal_description.to_string(),
        goal_type: goal_type.to_string(),
        model: model.to_string(),
        target_value,
        current_progress: Decimal::ZERO,
        time_limit_secs,
        status: SandboxStatus::Pending,
        agent_earnings: Decimal::ZERO,
        created_at: now,
        expires_at,
    }
}

/// Register a sandbox and open its market.
#[instrument(skip(conn, new), fields(model = %new.model))]
pub fn create_sandbox(conn: &Connection, new: &NewSandbox, now: i64) -> Result<Sandbox, BettingError> {
    let expires_at = validate_goal(new.target_value, new.time_limit_secs, now)?;

    let sandbox = build_sandbox(
        &new.goal_description,
        &new.goal_type,
        &new.model,
        new.target_value,
        new.time_limit_secs,
        now,
        expires_at,
    );
    records::insert_sandbox(conn, &sandbox)?;
    records::insert_market(conn, &Market::new(&sandbox.id, MarketKind::Sandbox, now))?;

    info!(sandbox = %sandbox.id, expires_at = sandbox.expires_at, "Sandbox created");
    Ok(sandbox)
}

fn transition(
    conn: &Connection,
    id: &str,
    action: &'static str,
    allowed: &[SandboxStatus],
    to: SandboxStatus,
) -> Result<Sandbox, BettingError> {
    let mut sandbox = require_sandbox(conn, id)?;
    if !allowed.contains(&sandbox.status) {
        return Err(BettingError::InvalidTransition {
            kind: "sandbox",
            action,
            status: sandbox.status.to_string(),
        });
    }

    records::set_sandbox_status(conn, id, to)?;
    info!(sandbox = %id, from = %sandbox.status, to = %to, "Sandbox status changed");
    sandbox.status = to;
    Ok(sandbox)
}

/// Mark a pending sandbox as running.
pub fn activate(conn: &Connection, id: &str) -> Result<Sandbox, BettingError> {
    transition(conn, id, "activate", &[SandboxStatus::Pending], SandboxStatus::Active)
}

/// Pause a running sandbox.
pub fn pause(conn: &Connection, id: &str) -> Result<Sandbox, BettingError> {
    transition(conn, id, "pause", &[SandboxStatus::Active], SandboxStatus::Paused)
}

/// Resume a paused sandbox.
pub fn resume(conn: &Connection, id: &str) -> Result<Sandbox, BettingError> {
    transition(conn, id, "resume", &[SandboxStatus::Paused], SandboxStatus::Active)
}

/// Abort a sandbox. Its market, if still unresolved, is refunded.
#[instrument(skip(conn))]
pub fn stop(
    conn: &Connection,
    id: &str,
) -> Result<(Sandbox, Option<SettlementSummary>), BettingError> {
    let sandbox = transition(
        conn,
        id,
        "stop",
        &[SandboxStatus::Pending, SandboxStatus::Active, SandboxStatus::Paused],
        SandboxStatus::Failed,
    )?;

    let refund = match records::get_market(conn, id)? {
        Some(_) => Some(settlement::refund(conn, id)?),
        None => None,
    };
    Ok((sandbox, refund))
}

/// Record the latest progress reported by the agent runner.
pub fn update_progress(conn: &Connection, id: &str, progress: Decimal) -> Result<Sandbox, BettingError> {
    if progress < Decimal::ZERO {
        return Err(BettingError::Invalid(format!(
            "progress must not be negative, got {progress}"
        )));
    }

    let mut sandbox = require_sandbox(conn, id)?;
    if sandbox.status.is_terminal() {
        return Err(BettingError::InvalidTransition {
            kind: "sandbox",
            action: "update progress of",
            status: sandbox.status.to_string(),
        });
    }

    records::set_sandbox_progress(conn, id, progress)?;
    sandbox.current_progress = progress;
    Ok(sandbox)
}

/// Finish a sandbox with a reported outcome and settle its market.
#[instrument(skip(conn), fields(outcome = %outcome))]
pub fn complete(
    conn: &Connection,
    id: &str,
    outcome: Outcome,
) -> Result<(Sandbox, Option<SettlementSummary>), BettingError> {
    let status = match outcome {
        Outcome::Success => SandboxStatus::Completed,
        Outcome::Failure => SandboxStatus::Failed,
    };
    let sandbox = transition(
        conn,
        id,
        "complete",
        &[SandboxStatus::Pending, SandboxStatus::Active, SandboxStatus::Paused],
        status,
    )?;

    let summary = match records::get_market(conn, id)? {
        Some(_) => Some(settlement::settle(conn, id, outcome.winning_side())?),
        None => None,
    };
    Ok((sandbox, summary))
}

/// Add a platform take to a sandbox's earnings. Returns the new total.
pub fn add_agent_earnings(conn: &Connection, id: &str, amount: Decimal) -> Result<Decimal, BettingError> {
    let sandbox = require_sandbox(conn, id)?;
    let earnings = sandbox.agent_earnings + amount;
    records::set_agent_earnings(conn, id, earnings)?;
    Ok(earnings)
}

/// Create two sandboxes racing on one goal plus the challenge market.
///
/// Side A backs `model_a`, side B backs `model_b`. The agent sandboxes get
/// no market of their own.
#[instrument(skip(conn, new), fields(model_a = %new.model_a, model_b = %new.model_b))]
pub fn create_challenge(
    conn: &Connection,
    new: &NewChallenge,
    now: i64,
) -> Result<Challenge, BettingError> {
    let expires_at = validate_goal(new.target_value, new.time_limit_secs, now)?;

    let agent = |model: &str| {
        build_sandbox(
            &new.goal_description,
            &new.goal_type,
            model,
            new.target_value,
            new.time_limit_secs,
            now,
            expires_at,
        )
    };
    let sandbox_a = agent(&new.model_a);
    let sandbox_b = agent(&new.model_b);
    records::insert_sandbox(conn, &sandbox_a)?;
    records::insert_sandbox(conn, &sandbox_b)?;

    let challenge = Challenge {
        id: Uuid::new_v4().to_string(),
        goal_description: new.goal_description.clone(),
        target_value: new.target_value,
        sandbox_a: sandbox_a.id,
        sandbox_b: sandbox_b.id,
        status: ChallengeStatus::Active,
        session_number: records::latest_session_number(conn)? + 1,
        created_at: now,
    };
    records::insert_challenge(conn, &challenge)?;
    records::insert_market(conn, &Market::new(&challenge.id, MarketKind::Challenge, now))?;

    info!(
        challenge = %challenge.id,
        session = challenge.session_number,
        "Challenge created"
    );
    Ok(challenge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Resolution;
    use crate::store::ArenaStore;
    use rust_decimal_macros::dec;

    fn new_sandbox() -> NewSandbox {
        NewSandbox {
            goal_description: "Reach 100 followers".to_string(),
            goal_type: "followers".to_string(),
            model: "model-a".to_string(),
            target_value: dec!(100),
            time_limit_secs: 600,
        }
    }

    #[test]
    fn create_sandbox_opens_market() {
        let store = ArenaStore::open_in_memory().unwrap();
        let sandbox = store
            .write(|tx| create_sandbox(tx, &new_sandbox(), 1_000))
            .unwrap();

        assert_eq!(sandbox.status, SandboxStatus::Pending);
        assert_eq!(sandbox.expires_at, 601_000);

        let market = store
            .read(|conn| records::get_market(conn, &sandbox.id))
            .unwrap()
            .unwrap();
        assert!(market.open);
        assert_eq!(market.kind, MarketKind::Sandbox);
    }

    #[test]
    fn rejects_non_positive_goal() {
        let store = ArenaStore::open_in_memory().unwrap();
        let mut new = new_sandbox();
        new.time_limit_secs = 0;

        let err = store.write(|tx| create_sandbox(tx, &new, 0)).unwrap_err();
        assert!(matches!(err, BettingError::Invalid(_)));
    }

    #[test]
    fn rejects_time_limit_past_clock_range() {
        let store = ArenaStore::open_in_memory().unwrap();
        let mut new = new_sandbox();
        new.time_limit_secs = i64::MAX / 1000 + 1;

        let err = store.write(|tx| create_sandbox(tx, &new, 1_000)).unwrap_err();
        assert!(matches!(err, BettingError::Invalid(_)));

        new.time_limit_secs = i64::MAX / 1000;
        let err = store
            .write(|tx| create_sandbox(tx, &new, i64::MAX / 2))
            .unwrap_err();
        assert!(matches!(err, BettingError::Invalid(_)));

        let sandboxes = store
            .read(|conn| records::list_sandboxes(conn, None))
            .unwrap();
        assert!(sandboxes.is_empty());
    }

    #[test]
    fn status_transitions_are_guarded() {
        let store = ArenaStore::open_in_memory().unwrap();
        let sandbox = store
            .write(|tx| create_sandbox(tx, &new_sandbox(), 0))
            .unwrap();

        let err = store.write(|tx| pause(tx, &sandbox.id)).unwrap_err();
        assert_eq!(err.to_string(), "cannot pause sandbox with status \"pending\"");

        store.write(|tx| activate(tx, &sandbox.id)).unwrap();
        store.write(|tx| pause(tx, &sandbox.id)).unwrap();
        let resumed = store.write(|tx| resume(tx, &sandbox.id)).unwrap();
        assert_eq!(resumed.status, SandboxStatus::Active);
    }

    #[test]
    fn progress_is_rejected_after_finish() {
        let store = ArenaStore::open_in_memory().unwrap();
        let sandbox = store
            .write(|tx| create_sandbox(tx, &new_sandbox(), 0))
            .unwrap();
        store.write(|tx| activate(tx, &sandbox.id)).unwrap();

        let updated = store
            .write(|tx| update_progress(tx, &sandbox.id, dec!(42)))
            .unwrap();
        assert_eq!(updated.current_progress, dec!(42));

        store
            .write(|tx| complete(tx, &sandbox.id, Outcome::Success))
            .unwrap();
        let err = store
            .write(|tx| update_progress(tx, &sandbox.id, dec!(50)))
            .unwrap_err();
        assert!(matches!(err, BettingError::InvalidTransition { .. }));
    }

    #[test]
    fn stop_refunds_market() {
        let store = ArenaStore::open_in_memory().unwrap();
        let sandbox = store
            .write(|tx| create_sandbox(tx, &new_sandbox(), 0))
            .unwrap();

        let (stopped, refund) = store.write(|tx| stop(tx, &sandbox.id)).unwrap();
        assert_eq!(stopped.status, SandboxStatus::Failed);
        assert_eq!(refund.unwrap().resolution, Resolution::Refunded);

        let err = store.write(|tx| stop(tx, &sandbox.id)).unwrap_err();
        assert!(matches!(err, BettingError::InvalidTransition { .. }));
    }

    #[test]
    fn challenge_numbers_sessions_sequentially() {
        let store = ArenaStore::open_in_memory().unwrap();
        let new = NewChallenge {
            goal_description: "First sale".to_string(),
            goal_type: "revenue".to_string(),
            target_value: dec!(1),
            time_limit_secs: 300,
            model_a: "model-a".to_string(),
            model_b: "model-b".to_string(),
        };

        let first = store.write(|tx| create_challenge(tx, &new, 0)).unwrap();
        let second = store.write(|tx| create_challenge(tx, &new, 10)).unwrap();
        assert_eq!(first.session_number, 1);
        assert_eq!(second.session_number, 2);

        let (a, market) = store
            .read(|conn| {
                Ok::<_, BettingError>((
                    require_sandbox(conn, &first.sandbox_a)?,
                    records::get_market(conn, &first.id)?,
                ))
            })
            .unwrap();
        assert_eq!(a.model, "model-a");
        assert_eq!(market.unwrap().kind, MarketKind::Challenge);

        let own_market = store
            .read(|conn| records::get_market(conn, &first.sandbox_a))
            .unwrap();
        assert!(own_market.is_none());
    }
}
