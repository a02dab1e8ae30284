//! Explicit run state machine.
//!
//! ```text
//! Planning -> Fetching -> Blocked | Partial | Error | Success
//! ```
//!
//! Terminal states absorb every further event.

use crate::models::IngestionOutcome;

/// Consecutive non-blocking friction events that end a run.
pub const MAX_CONSECUTIVE_FRICTION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Fetching,
    Blocked,
    Partial,
    Error,
    Success,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Planning | RunState::Fetching)
    }

    /// Outcome recorded for this state.
    pub fn outcome(&self) -> IngestionOutcome {
        match self {
            RunState::Planning | RunState::Fetching => IngestionOutcome::InProgress,
            RunState::Blocked => IngestionOutcome::Blocked,
            RunState::Partial => IngestionOutcome::Partial,
            RunState::Error => IngestionOutcome::Error,
            RunState::Success => IngestionOutcome::Success,
        }
    }
}

/// Tracks the run state and the consecutive-friction counter.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    consecutive_friction: u32,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Planning,
            consecutive_friction: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn consecutive_friction(&self) -> u32 {
        self.consecutive_friction
    }

    /// Planning is done; URLs are about to be fetched.
    pub fn start_fetching(&mut self) -> RunState {
        if self.state == RunState::Planning {
            self.state = RunState::Fetching;
        }
        self.state
    }

    /// A fetch produced friction.
    pub fn on_friction(&mut self, bot_protection: bool) -> RunState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = RunState::Fetching;
        self.consecutive_friction += 1;
        if bot_protection {
            self.state = RunState::Blocked;
        } else if self.consecutive_friction >= MAX_CONSECUTIVE_FRICTION {
            self.state = RunState::Partial;
        }
        self.state
    }

    /// A fetch succeeded without friction.
    pub fn on_success(&mut self) -> RunState {
        if !self.state.is_terminal() {
            self.state = RunState::Fetching;
            self.consecutive_friction = 0;
        }
        self.state
    }

    /// The queue ran out without an early stop.
    pub fn finish(&mut self, pages_used: u32, pages_planned: u32) -> RunState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = if pages_used == 0 {
            RunState::Error
        } else if pages_used * 2 < pages_planned {
            RunState::Partial
        } else {
            RunState::Success
        };
        self.state
    }

    /// The caller cancelled the run.
    pub fn cancel(&mut self, pages_used: u32) -> RunState {
        if !self.state.is_terminal() {
            self.state = if pages_used > 0 {
                RunState::Partial
            } else {
                RunState::Error
            };
        }
        self.state
    }

    /// An internal failure ended the run. Overrides any earlier state.
    pub fn fail(&mut self) -> RunState {
        self.state = RunState::Error;
        self.state
    }
}
