//! Invocation state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Pending,
    Building,
    Applying,
    Verifying,
    Confirmed,
    RollingBack,
    Done,
    Failed,
}

impl EngineState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Applying => "applying",
            Self::Verifying => "verifying",
            Self::Confirmed => "confirmed",
            Self::RollingBack => "rolling_back",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the machine may move from `self` to `next`.
    ///
    /// `Pending -> RollingBack` is the entry point for an explicit teardown,
    /// which skips building and applying.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Building | Self::RollingBack)
                | (Self::Building, Self::Applying | Self::Failed)
                | (
                    Self::Applying,
                    Self::Verifying | Self::Confirmed | Self::RollingBack
                )
                | (Self::Verifying, Self::Confirmed | Self::RollingBack)
                | (Self::Confirmed, Self::Done)
                | (Self::RollingBack, Self::Done | Self::Failed)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: EngineState,
    pub to: EngineState,
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    current: EngineState,
    visited: Vec<EngineState>,
}

impl StateMachine {
    /// Starts in [`EngineState::Pending`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: EngineState::Pending,
            visited: vec![EngineState::Pending],
        }
    }

    #[must_use]
    pub const fn current(&self) -> EngineState {
        self.current
    }

    /// Every state visited so far, starting with `Pending`.
    #[must_use]
    pub fn visited(&self) -> &[EngineState] {
        &self.visited
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and stays put if the edge is not allowed.
    pub fn advance(&mut self, next: EngineState) -> Result<(), InvalidTransition> {
        if !self.current.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::info!(from = %self.current, to = %next, "State transition");
        self.current = next;
        self.visited.push(next);
        Ok(())
    }

    /// Consumes the machine, returning the visited states.
    #[must_use]
    pub fn into_visited(self) -> Vec<EngineState> {
        self.visited
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
