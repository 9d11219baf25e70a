//! Pipeline-wide lifecycle state.

use serde::{Deserialize, Serialize};

/// Run state shared by the pipeline and every stage in it.
///
/// Upward order is `Idle -> Ready -> Paused -> Playing`. `Stopped` is
/// reachable from any state and is terminal for a pipeline instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum LifecycleState {
    /// Constructed and linked, no resources allocated
    #[default]
    Idle,
    /// Resources allocated, not yet prepared for data flow
    Ready,
    /// Prepared for data flow, frames not moving
    Paused,
    /// Frames moving
    Playing,
    /// Torn down; terminal
    Stopped,
}

impl LifecycleState {
    /// Position in the upward chain; `None` for `Stopped`.
    const fn rank(self) -> Option<u8> {
        match self {
            LifecycleState::Idle => Some(0),
            LifecycleState::Ready => Some(1),
            LifecycleState::Paused => Some(2),
            LifecycleState::Playing => Some(3),
            LifecycleState::Stopped => None,
        }
    }

    /// Next state on the way up, if any.
    pub const fn next_up(self) -> Option<Self> {
        match self {
            LifecycleState::Idle => Some(LifecycleState::Ready),
            LifecycleState::Ready => Some(LifecycleState::Paused),
            LifecycleState::Paused => Some(LifecycleState::Playing),
            LifecycleState::Playing | LifecycleState::Stopped => None,
        }
    }

    /// Next state on the way down to `Stopped`.
    pub const fn next_down(self) -> Option<Self> {
        match self {
            LifecycleState::Playing => Some(LifecycleState::Paused),
            LifecycleState::Paused => Some(LifecycleState::Ready),
            LifecycleState::Ready | LifecycleState::Idle => Some(LifecycleState::Stopped),
            LifecycleState::Stopped => None,
        }
    }

    /// Whether `target` lies strictly above `self` on the upward chain.
    pub fn is_below(self, target: Self) -> bool {
        match (self.rank(), target.rank()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Stopped)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "IDLE"),
            LifecycleState::Ready => write!(f, "READY"),
            LifecycleState::Paused => write!(f, "PAUSED"),
            LifecycleState::Playing => write!(f, "PLAYING"),
            LifecycleState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// One step of a state change, as seen by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl StateTransition {
    pub const fn new(from: LifecycleState, to: LifecycleState) -> Self {
        Self { from, to }
    }

    pub fn is_upward(&self) -> bool {
        self.from.is_below(self.to)
    }
}

impl std::fmt::Display for StateTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
