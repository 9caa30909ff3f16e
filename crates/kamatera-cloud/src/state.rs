//! Lifecycle state of managed resources
//!
//! A managed server moves through
//! `Absent -> Creating -> Present -> Updating -> Present -> Destroying -> Absent`.
//! The records here are what an external driver persists between
//! reconciliations; the engine itself keeps no state across calls.

use crate::model::{
    ComputeInstanceSpec, ComputeInstanceState, InstanceId, NetworkSpec, NetworkState, PowerState,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle position of one managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "power", rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Creating,
    Present(PowerState),
    Updating,
    Destroying,
}

impl LifecycleState {
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Absent, Creating)
                | (Creating, Present(_))
                | (Present(_), Present(_))
                | (Present(_), Updating)
                | (Updating, Present(_))
                | (_, Destroying)
                | (Destroying, Absent)
        )
    }

    pub fn is_present(&self) -> bool {
        matches!(self, LifecycleState::Present(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Absent => write!(f, "absent"),
            LifecycleState::Creating => write!(f, "creating"),
            LifecycleState::Present(PowerState::On) => write!(f, "present (powered on)"),
            LifecycleState::Present(PowerState::Off) => write!(f, "present (powered off)"),
            LifecycleState::Updating => write!(f, "updating"),
            LifecycleState::Destroying => write!(f, "destroying"),
        }
    }
}

/// Transitions taken during one reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    current: LifecycleState,
    history: Vec<LifecycleState>,
}

impl Lifecycle {
    pub fn starting_at(state: LifecycleState) -> Self {
        Self {
            current: state,
            history: vec![state],
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// States visited so far, starting state included
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Record a transition; returns false and stays put when it is not allowed
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if !self.current.can_transition_to(next) {
            return false;
        }
        self.current = next;
        self.history.push(next);
        true
    }
}

/// A server under management: identity, what was last applied, what was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedInstance {
    pub id: InstanceId,

    /// Last spec successfully applied; source of truth for write-only attributes
    pub applied: ComputeInstanceSpec,

    pub observed: ComputeInstanceState,

    /// Password generated by the control plane at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,

    /// Adopted rather than created; write-only attributes of `applied` are unknown
    #[serde(default)]
    pub imported: bool,
}

impl ManagedInstance {
    pub fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::Present(self.observed.power)
    }
}

/// A private network under management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedNetwork {
    pub applied: NetworkSpec,
    pub observed: NetworkState,
}
