//! Tracked entities that markets are opened on.
//!
//! This module handles:
//! - Sandbox and challenge records
//! - Status transitions and progress reports from the agent runner

pub mod registry;
pub mod types;

pub use types::{Challenge, ChallengeStatus, NewChallenge, NewSandbox, Sandbox, SandboxStatus};
