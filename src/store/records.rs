//! Row mapping and record queries.
//!
//! Every function takes a borrowed connection so callers decide the
//! transaction boundary; a `Transaction` derefs to `Connection`.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::entity::{Challenge, ChallengeStatus, Sandbox, SandboxStatus};
use crate::ledger::User;
use crate::market::{Bet, Market, OddsSnapshot, Resolution, Side};

/// Maximum rows returned by bet listings.
pub const LISTING_LIMIT: usize = 200;

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

// === Users ===

const USER_COLUMNS: &str = "id, name, email, balance, created_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        balance: decimal_at(row, 3)?,
        created_at: row.get(4)?,
    })
}

/// Insert a new user.
pub fn insert_user(conn: &Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, email, balance, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.name,
            user.email,
            user.balance.to_string(),
            user.created_at
        ],
    )?;
    Ok(())
}

/// Fetch a user by id.
pub fn get_user(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        [id],
        map_user,
    )
    .optional()
}

/// Fetch a user by email.
pub fn get_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        [email],
        map_user,
    )
    .optional()
}

/// Overwrite a user's balance.
pub fn set_balance(conn: &Connection, id: &str, balance: Decimal) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET balance = ?2 WHERE id = ?1",
        params![id, balance.to_string()],
    )
}

// === Sandboxes ===

const SANDBOX_COLUMNS: &str = "id, goal_description, goal_type, model, target_value, \
     current_progress, time_limit_secs, status, agent_earnings, created_at, expires_at";

fn map_sandbox(row: &Row<'_>) -> rusqlite::Result<Sandbox> {
    Ok(Sandbox {
        id: row.get(0)?,
        goal_description: row.get(1)?,
        goal_type: row.get(2)?,
        model: row.get(3)?,
        target_value: decimal_at(row, 4)?,
        current_progress: decimal_at(row, 5)?,
        time_limit_secs: row.get(6)?,
        status: enum_at(row, 7)?,
        agent_earnings: decimal_at(row, 8)?,
        created_at: row.get(9)?,
        expires_at: row.get(10)?,
    })
}

/// Insert a new sandbox.
pub fn insert_sandbox(conn: &Connection, sandbox: &Sandbox) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO sandboxes ({SANDBOX_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            sandbox.id,
            sandbox.goal_description,
            sandbox.goal_type,
            sandbox.model,
            sandbox.target_value.to_string(),
            sandbox.current_progress.to_string(),
            sandbox.time_limit_secs,
            sandbox.status.to_string(),
            sandbox.agent_earnings.to_string(),
            sandbox.created_at,
            sandbox.expires_at,
        ],
    )?;
    Ok(())
}

/// Fetch a sandbox by id.
pub fn get_sandbox(conn: &Connection, id: &str) -> rusqlite::Result<Option<Sandbox>> {
    conn.query_row(
        &format!("SELECT {SANDBOX_COLUMNS} FROM sandboxes WHERE id = ?1"),
        [id],
        map_sandbox,
    )
    .optional()
}

/// List sandboxes, optionally filtered by status, newest first.
pub fn list_sandboxes(
    conn: &Connection,
    status: Option<SandboxStatus>,
) -> rusqlite::Result<Vec<Sandbox>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SANDBOX_COLUMNS} FROM sandboxes \
         WHERE ?1 IS NULL OR status = ?1 \
         ORDER BY created_at DESC LIMIT {LISTING_LIMIT}"
    ))?;
    let rows = stmt.query_map([status.map(|s| s.to_string())], map_sandbox)?;
    rows.collect()
}

/// Ids of non-terminal sandboxes whose time limit has run out at `now`.
pub fn expired_unfinished_sandbox_ids(conn: &Connection, now: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM sandboxes \
         WHERE status NOT IN ('completed', 'failed') AND expires_at <= ?1 \
         ORDER BY expires_at ASC",
    )?;
    let rows = stmt.query_map([now], |row| row.get(0))?;
    rows.collect()
}

/// Update a sandbox's status.
pub fn set_sandbox_status(
    conn: &Connection,
    id: &str,
    status: SandboxStatus,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sandboxes SET status = ?2 WHERE id = ?1",
        params![id, status.to_string()],
    )
}

/// Update a sandbox's reported progress.
pub fn set_sandbox_progress(conn: &Connection, id: &str, progress: Decimal) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sandboxes SET current_progress = ?2 WHERE id = ?1",
        params![id, progress.to_string()],
    )
}

/// Overwrite a sandbox's accumulated agent earnings.
pub fn set_agent_earnings(conn: &Connection, id: &str, earnings: Decimal) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sandboxes SET agent_earnings = ?2 WHERE id = ?1",
        params![id, earnings.to_string()],
    )
}

// === Challenges ===

const CHALLENGE_COLUMNS: &str =
    "id, goal_description, target_value, sandbox_a, sandbox_b, status, session_number, created_at";

fn map_challenge(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        goal_description: row.get(1)?,
        target_value: decimal_at(row, 2)?,
        sandbox_a: row.get(3)?,
        sandbox_b: row.get(4)?,
        status: enum_at(row, 5)?,
        session_number: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Insert a new challenge.
pub fn insert_challenge(conn: &Connection, challenge: &Challenge) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO challenges ({CHALLENGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            challenge.id,
            challenge.goal_description,
            challenge.target_value.to_string(),
            challenge.sandbox_a,
            challenge.sandbox_b,
            challenge.status.to_string(),
            challenge.session_number,
            challenge.created_at,
        ],
    )?;
    Ok(())
}

/// Fetch a challenge by id.
pub fn get_challenge(conn: &Connection, id: &str) -> rusqlite::Result<Option<Challenge>> {
    conn.query_row(
        &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?1"),
        [id],
        map_challenge,
    )
    .optional()
}

/// Highest session number handed out so far (0 when none).
pub fn latest_session_number(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(session_number), 0) FROM challenges",
        [],
        |row| row.get(0),
    )
}

/// Update a challenge's status.
pub fn set_challenge_status(
    conn: &Connection,
    id: &str,
    status: ChallengeStatus,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE challenges SET status = ?2 WHERE id = ?1",
        params![id, status.to_string()],
    )
}

// === Markets ===

const MARKET_COLUMNS: &str =
    "entity_id, kind, yes_total, no_total, open, platform_take, unallocated, resolution, created_at";

fn map_market(row: &Row<'_>) -> rusqlite::Result<Market> {
    let resolution: Option<String> = row.get(7)?;
    Ok(Market {
        entity_id: row.get(0)?,
        kind: enum_at(row, 1)?,
        yes_total: decimal_at(row, 2)?,
        no_total: decimal_at(row, 3)?,
        open: row.get(4)?,
        platform_take: opt_decimal_at(row, 5)?,
        unallocated: opt_decimal_at(row, 6)?,
        resolution: resolution
            .map(|r| Resolution::from_str(&r).map_err(|e| conversion_error(7, e)))
            .transpose()?,
        created_at: row.get(8)?,
    })
}

/// Insert a new market.
pub fn insert_market(conn: &Connection, market: &Market) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO markets ({MARKET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            market.entity_id,
            market.kind.to_string(),
            market.yes_total.to_string(),
            market.no_total.to_string(),
            market.open,
            opt_decimal_text(market.platform_take),
            opt_decimal_text(market.unallocated),
            market.resolution.map(|r| r.to_string()),
            market.created_at,
        ],
    )?;
    Ok(())
}

/// Fetch a market by tracked entity id.
pub fn get_market(conn: &Connection, entity_id: &str) -> rusqlite::Result<Option<Market>> {
    conn.query_row(
        &format!("SELECT {MARKET_COLUMNS} FROM markets WHERE entity_id = ?1"),
        [entity_id],
        map_market,
    )
    .optional()
}

/// All markets still accepting bets.
pub fn open_markets(conn: &Connection) -> rusqlite::Result<Vec<Market>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MARKET_COLUMNS} FROM markets WHERE open = 1 ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map([], map_market)?;
    rows.collect()
}

/// Write new side totals.
pub fn set_market_totals(
    conn: &Connection,
    entity_id: &str,
    yes_total: Decimal,
    no_total: Decimal,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE markets SET yes_total = ?2, no_total = ?3 WHERE entity_id = ?1",
        params![entity_id, yes_total.to_string(), no_total.to_string()],
    )
}

/// Stop accepting bets. Returns whether the flag actually flipped.
pub fn close_market(conn: &Connection, entity_id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE markets SET open = 0 WHERE entity_id = ?1 AND open = 1",
        [entity_id],
    )?;
    Ok(changed > 0)
}

/// Close the market and record its resolution. Only writes once.
pub fn resolve_market(
    conn: &Connection,
    entity_id: &str,
    resolution: Resolution,
    platform_take: Option<Decimal>,
    unallocated: Option<Decimal>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE markets SET open = 0, resolution = ?2, platform_take = ?3, unallocated = ?4 \
         WHERE entity_id = ?1 AND resolution IS NULL",
        params![
            entity_id,
            resolution.to_string(),
            opt_decimal_text(platform_take),
            opt_decimal_text(unallocated),
        ],
    )?;
    Ok(changed > 0)
}

// === Bets ===

const BET_COLUMNS: &str =
    "id, entity_id, user_id, side, stake, odds_at_placement, settled, payout, placed_at";

fn map_bet(row: &Row<'_>) -> rusqlite::Result<Bet> {
    Ok(Bet {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        user_id: row.get(2)?,
        side: enum_at::<Side>(row, 3)?,
        stake: decimal_at(row, 4)?,
        odds_at_placement: decimal_at(row, 5)?,
        settled: row.get(6)?,
        payout: opt_decimal_at(row, 7)?,
        placed_at: row.get(8)?,
    })
}

/// Insert a new bet.
pub fn insert_bet(conn: &Connection, bet: &Bet) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO bets ({BET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            bet.id,
            bet.entity_id,
            bet.user_id,
            bet.side.to_string(),
            bet.stake.to_string(),
            bet.odds_at_placement.to_string(),
            bet.settled,
            opt_decimal_text(bet.payout),
            bet.placed_at,
        ],
    )?;
    Ok(())
}

/// Unsettled bets on a market, in placement order.
pub fn unsettled_bets(conn: &Connection, entity_id: &str) -> rusqlite::Result<Vec<Bet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BET_COLUMNS} FROM bets WHERE entity_id = ?1 AND settled = 0 ORDER BY seq ASC"
    ))?;
    let rows = stmt.query_map([entity_id], map_bet)?;
    rows.collect()
}

/// Recent bets on a market, newest first.
pub fn bets_for_entity(conn: &Connection, entity_id: &str) -> rusqlite::Result<Vec<Bet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BET_COLUMNS} FROM bets WHERE entity_id = ?1 ORDER BY seq DESC LIMIT {LISTING_LIMIT}"
    ))?;
    let rows = stmt.query_map([entity_id], map_bet)?;
    rows.collect()
}

/// Recent bets by a user, newest first.
pub fn bets_for_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Bet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BET_COLUMNS} FROM bets WHERE user_id = ?1 ORDER BY seq DESC LIMIT {LISTING_LIMIT}"
    ))?;
    let rows = stmt.query_map([user_id], map_bet)?;
    rows.collect()
}

/// Mark a bet settled with its payout. Returns false if it was already settled.
pub fn settle_bet(conn: &Connection, bet_id: &str, payout: Decimal) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE bets SET settled = 1, payout = ?2 WHERE id = ?1 AND settled = 0",
        params![bet_id, payout.to_string()],
    )?;
    Ok(changed > 0)
}

// === Odds history ===

/// Append an odds snapshot.
pub fn insert_odds_snapshot(conn: &Connection, snapshot: &OddsSnapshot) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO odds_history (entity_id, prob_yes, prob_no, recorded_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            snapshot.entity_id,
            snapshot.prob_yes.to_string(),
            snapshot.prob_no.to_string(),
            snapshot.recorded_at,
        ],
    )?;
    Ok(())
}

/// Odds snapshots for a market, oldest first.
pub fn odds_history(
    conn: &Connection,
    entity_id: &str,
    limit: usize,
) -> rusqlite::Result<Vec<OddsSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, prob_yes, prob_no, recorded_at FROM odds_history \
         WHERE entity_id = ?1 ORDER BY recorded_at ASC, seq ASC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![entity_id, limit as i64], |row| {
        Ok(OddsSnapshot {
            entity_id: row.get(0)?,
            prob_yes: decimal_at(row, 1)?,
            prob_no: decimal_at(row, 2)?,
            recorded_at: row.get(3)?,
        })
    })?;
    rows.collect()
}
