//! User balances.
//!
//! Every mutation goes through [`credit`] or [`debit`] inside the caller's
//! transaction, so a balance is never observed half-updated and never goes
//! negative.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::BettingError;
use crate::store::records;

/// A bettor's account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unique email.
    pub email: String,
    /// Spendable balance, never negative.
    pub balance: Decimal,
    /// Creation time (unix ms).
    pub created_at: i64,
}

impl User {
    /// Build a new user with a fresh id.
    pub fn new(name: impl Into<String>, email: impl Into<String>, balance: Decimal, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            balance,
            created_at: now,
        }
    }
}

/// Load a user or fail with `NotFound`.
pub fn require_user(conn: &Connection, user_id: &str) -> Result<User, BettingError> {
    records::get_user(conn, user_id)?.ok_or_else(|| BettingError::not_found("user", user_id))
}

/// Add `amount` to a user's balance and return the new balance.
///
/// A credit the balance cannot represent fails with `InvalidAmount`.
pub fn credit(conn: &Connection, user_id: &str, amount: Decimal) -> Result<Decimal, BettingError> {
    if amount <= Decimal::ZERO {
        return Err(BettingError::InvalidAmount(amount));
    }

    let user = require_user(conn, user_id)?;
    let balance = user
        .balance
        .checked_add(amount)
        .ok_or(BettingError::InvalidAmount(amount))?;
    records::set_balance(conn, user_id, balance)?;

    debug!(user = %user_id, amount = %amount, balance = %balance, "Balance credited");
    Ok(balance)
}

/// Remove `amount` from a user's balance and return the new balance.
///
/// Fails with `InsufficientBalance` instead of going negative.
pub fn debit(conn: &Connection, user_id: &str, amount: Decimal) -> Result<Decimal, BettingError> {
    if amount <= Decimal::ZERO {
        return Err(BettingError::InvalidAmount(amount));
    }

    let user = require_user(conn, user_id)?;
    if user.balance < amount {
        return Err(BettingError::InsufficientBalance {
            required: amount,
            available: user.balance,
        });
    }

    let balance = user.balance - amount;
    records::set_balance(conn, user_id, balance)?;

    debug!(user = %user_id, amount = %amount, balance = %balance, "Balance debited");
    Ok(balance)
}

/// Return the user with this email, creating it with `starting_balance` if absent.
pub fn ensure_user(
    conn: &Connection,
    name: &str,
    email: &str,
    starting_balance: Decimal,
    now: i64,
) -> Result<User, BettingError> {
    if let Some(existing) = records::get_user_by_email(conn, email)? {
        return Ok(existing);
    }

    let user = User::new(name, email, starting_balance, now);
    records::insert_user(conn, &user)?;
    Ok(user)
}
