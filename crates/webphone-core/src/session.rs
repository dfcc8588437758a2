//! Call session types and the per-call state machine
//!
//! Every call slot holds at most one session. Its [`CallState`] only moves
//! through [`CallState::apply`], which refuses transitions the call
//! lifecycle does not allow:
//!
//! ```text
//! Calling ──► Progress ──► Talking ◄──► OnHold
//!    │           │            │           │
//!    ├──► Rejected / Cancel ──┤           │
//!    └───────────┴────────────┴───────────┴──► Terminated
//! ```
//!
//! `Terminated` is absorbing: once a session reaches it the controller
//! frees the slot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Index of a call slot, in `[0, max_sessions)`
pub type SlotId = usize;

/// Controller-assigned id correlating signaling events with a session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a call relative to the local user
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// INVITE sent, no response yet
    Calling,
    /// Provisional response received
    Progress,
    /// Call answered and active
    Talking,
    /// Call answered and held
    OnHold,
    /// Remote side rejected the call
    Rejected,
    /// Call was cancelled before answer
    Cancel,
    /// Call ended; the slot is free
    Terminated,
}

impl CallState {
    /// Whether the session is over and its slot can be reused
    pub fn is_terminal(self) -> bool {
        self == CallState::Terminated
    }

    /// Whether the call has been answered and not yet ended
    pub fn is_established(self) -> bool {
        matches!(self, CallState::Talking | CallState::OnHold)
    }

    /// Compute the state reached from `self` by `trigger`
    pub fn apply(self, trigger: Trigger) -> Result<CallState, InvalidTransition> {
        use CallState::*;

        let next = match (self, trigger) {
            (Terminated, _) => None,
            // failures and BYE end the call from any live state
            (_, Trigger::Failed) | (_, Trigger::Terminated) => Some(Terminated),

            (Calling | Progress, Trigger::Progress) => Some(Progress),
            (Calling | Progress, Trigger::Accepted) => Some(Talking),
            (Calling | Progress, Trigger::Rejected) => Some(Rejected),
            (Calling | Progress, Trigger::Cancelled) => Some(Cancel),

            (Talking, Trigger::Hold) => Some(OnHold),
            (OnHold, Trigger::Resume) => Some(Talking),

            _ => None,
        };

        next.ok_or(InvalidTransition { from: self, trigger })
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CallState::Calling => "calling",
            CallState::Progress => "progress",
            CallState::Talking => "talking",
            CallState::OnHold => "on hold",
            CallState::Rejected => "rejected",
            CallState::Cancel => "cancel",
            CallState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Something that moves a session from one state to another
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Trigger {
    Progress,
    Accepted,
    Rejected,
    Cancelled,
    Failed,
    Terminated,
    Hold,
    Resume,
}

impl Trigger {
    /// Verb used in error messages
    pub fn action(self) -> &'static str {
        match self {
            Trigger::Progress => "progress",
            Trigger::Accepted => "accept",
            Trigger::Rejected => "reject",
            Trigger::Cancelled => "cancel",
            Trigger::Failed => "fail",
            Trigger::Terminated => "terminate",
            Trigger::Hold => "hold",
            Trigger::Resume => "resume",
        }
    }
}

/// A transition the state machine refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: CallState,
    pub trigger: Trigger,
}

/// Snapshot of the session occupying a slot
///
/// This is what the host UI receives with every session update. The
/// signaling handle itself stays inside the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    /// Slot the session occupies
    pub slot: SlotId,
    /// Id correlating signaling events with this session
    pub call_id: CallId,
    /// Current lifecycle state
    pub state: CallState,
    /// Who placed the call
    pub direction: CallDirection,
    /// Number dialled or calling
    pub peer_number: String,
    /// Display name of the peer
    pub peer_name: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl CallSession {
    /// New outbound session in state `Calling`
    pub fn outbound(slot: SlotId, call_id: CallId, destination: &str) -> Self {
        let now = Utc::now();
        Self {
            slot,
            call_id,
            state: CallState::Calling,
            direction: CallDirection::Outbound,
            peer_number: destination.to_string(),
            peer_name: destination.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply `trigger`, updating the state and timestamp on success
    pub fn transition(&mut self, trigger: Trigger) -> Result<CallState, InvalidTransition> {
        let next = self.state.apply(trigger)?;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}
