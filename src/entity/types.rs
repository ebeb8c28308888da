//! Tracked entities: agent sandboxes and head-to-head challenges.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Sandbox lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SandboxStatus {
    /// Created, agent not launched yet.
    #[default]
    Pending,
    /// Agent running.
    Active,
    /// Agent paused by an operator.
    Paused,
    /// Goal reached.
    Completed,
    /// Goal missed, stopped or timed out.
    Failed,
}

impl SandboxStatus {
    /// Completed and failed are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SandboxStatus::Completed | SandboxStatus::Failed)
    }
}

/// An agent sandbox pursuing a measurable goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sandbox {
    /// Sandbox id.
    pub id: String,
    /// Human-readable goal.
    pub goal_description: String,
    /// Goal category (followers, revenue, ...).
    pub goal_type: String,
    /// Model driving the agent.
    pub model: String,
    /// Value that counts as reaching the goal.
    pub target_value: Decimal,
    /// Latest reported progress.
    pub current_progress: Decimal,
    /// Time budget in seconds.
    pub time_limit_secs: i64,
    /// Lifecycle status.
    pub status: SandboxStatus,
    /// Platform take credited from settled markets.
    pub agent_earnings: Decimal,
    /// Creation time (unix ms).
    pub created_at: i64,
    /// `created_at + time_limit` (unix ms).
    pub expires_at: i64,
}

impl Sandbox {
    /// Milliseconds since creation at `now`.
    pub fn elapsed_ms(&self, now: i64) -> i64 {
        now - self.created_at
    }

    /// Fraction of the goal reached; zero when the target is not positive.
    pub fn progress_ratio(&self) -> Decimal {
        if self.target_value > Decimal::ZERO {
            self.current_progress / self.target_value
        } else {
            Decimal::ZERO
        }
    }

    /// Whether the time limit has run out at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Parameters for creating a sandbox.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSandbox {
    /// Human-readable goal.
    pub goal_description: String,
    /// Goal category.
    #[serde(default = "default_goal_type")]
    pub goal_type: String,
    /// Model driving the agent.
    pub model: String,
    /// Value that counts as reaching the goal.
    pub target_value: Decimal,
    /// Time budget in seconds.
    pub time_limit_secs: i64,
}

fn default_goal_type() -> String {
    "custom".to_string()
}

/// Challenge lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChallengeStatus {
    /// Agents running, market live.
    #[default]
    Active,
    /// Winner decided or stakes refunded.
    Completed,
}

/// Two sandboxes racing toward the same goal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Challenge {
    /// Challenge id.
    pub id: String,
    /// Shared goal.
    pub goal_description: String,
    /// Shared target.
    pub target_value: Decimal,
    /// Sandbox backed by side A.
    pub sandbox_a: String,
    /// Sandbox backed by side B.
    pub sandbox_b: String,
    /// Lifecycle status.
    pub status: ChallengeStatus,
    /// Sequential session number shown to viewers.
    pub session_number: i64,
    /// Creation time (unix ms).
    pub created_at: i64,
}

/// Parameters for creating a challenge.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChallenge {
    /// Shared goal.
    pub goal_description: String,
    /// Goal category.
    #[serde(default = "default_goal_type")]
    pub goal_type: String,
    /// Shared target.
    pub target_value: Decimal,
    /// Shared time budget in seconds.
    pub time_limit_secs: i64,
    /// Model for the side A agent.
    pub model_a: String,
    /// Model for the side B agent.
    pub model_b: String,
}
