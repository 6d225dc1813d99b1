//! Per-mechanism toggle state machine

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Which set of settings a toggle operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mechanism {
    /// WinINet system proxy (`Internet Settings` key)
    SystemProxy,
    /// Per-user `HTTP_PROXY` environment default (`Environment` key)
    EnvProxy,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SystemProxy => write!(f, "system proxy"),
            Self::EnvProxy => write!(f, "environment proxy"),
        }
    }
}

/// Toggle runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    /// Store holds the user's own settings
    #[default]
    Inactive,
    /// Store redirected through the local proxy; a snapshot awaits restore
    Active,
}

impl std::fmt::Display for ToggleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// State transition event for the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Capture and apply (from Inactive)
    Enable,
    /// Restore (from Active)
    Disable,
}

impl ToggleState {
    /// Check if the transition is valid from the current state
    pub fn can_apply(&self, transition: StateTransition) -> bool {
        matches!(
            (self, transition),
            (ToggleState::Inactive, StateTransition::Enable)
                | (ToggleState::Active, StateTransition::Disable)
        )
    }

    /// State reached after the transition, if it is valid
    pub fn next(&self, transition: StateTransition) -> Option<ToggleState> {
        if !self.can_apply(transition) {
            return None;
        }
        Some(match transition {
            StateTransition::Enable => ToggleState::Active,
            StateTransition::Disable => ToggleState::Inactive,
        })
    }
}

/// Toggle state with metadata
#[derive(Debug, Clone)]
pub struct ToggleContext {
    pub mechanism: Mechanism,

    pub state: ToggleState,

    /// Port the store currently points at while active
    pub port: Option<u16>,

    /// Timestamp of last state change (Unix timestamp in seconds)
    pub last_transition_at: u64,
}

impl ToggleContext {
    pub fn new(mechanism: Mechanism) -> Self {
        Self {
            mechanism,
            state: ToggleState::Inactive,
            port: None,
            last_transition_at: current_timestamp(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ToggleState::Active
    }

    /// Apply a transition; returns false and leaves the context untouched if invalid
    pub fn transition(&mut self, transition: StateTransition, port: Option<u16>) -> bool {
        let Some(next) = self.state.next(transition) else {
            return false;
        };
        self.state = next;
        self.port = match next {
            ToggleState::Active => port,
            ToggleState::Inactive => None,
        };
        self.last_transition_at = current_timestamp();
        true
    }

    /// Get seconds since last transition
    pub fn seconds_since_transition(&self) -> u64 {
        current_timestamp().saturating_sub(self.last_transition_at)
    }
}

/// Get current Unix timestamp in seconds
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
