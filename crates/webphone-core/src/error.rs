//! Error types for the webphone controller

use thiserror::Error;

use crate::session::{CallState, SlotId};

/// Result type for controller operations
pub type PhoneResult<T> = Result<T, PhoneError>;

/// Errors returned by [`CallController`](crate::CallController) commands
/// and by the collaborators it drives.
///
/// Precondition failures (not connected, no free slot, empty slot) are the
/// controller refusing to act; nothing was sent to the signaling stack when
/// one of those is returned.
#[derive(Debug, Error)]
pub enum PhoneError {
    /// `init()` has not run yet
    #[error("Controller is not initialized")]
    NotInitialized,

    /// Signaling transport is not connected
    #[error("Signaling transport is not connected")]
    NotConnected,

    /// Every call slot is occupied
    #[error("All {max_sessions} call slots are in use")]
    NoFreeSlot { max_sessions: usize },

    /// Slot index outside `[0, max_sessions)`
    #[error("Slot {slot} is out of range (max sessions: {max_sessions})")]
    InvalidSlot { slot: SlotId, max_sessions: usize },

    /// Slot holds no session
    #[error("No session at slot {slot}")]
    EmptySlot { slot: SlotId },

    /// No session is currently talking
    #[error("No active call")]
    NoActiveCall,

    /// Key is not a DTMF tone
    #[error("Invalid DTMF key: {key:?}")]
    InvalidDtmf { key: char },

    /// A media plug session already exists
    #[error("Media plug session already exists")]
    MediaPlugBusy,

    /// The requested state change is not allowed from the current state
    #[error("Invalid transition for slot {slot}: cannot {action} while {state}")]
    InvalidTransition {
        slot: SlotId,
        state: CallState,
        action: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Signaling stack error
    #[error("Signaling error in {operation}: {details}")]
    Signaling { operation: String, details: String },

    /// Host media error
    #[error("Media error: {message}")]
    Media { message: String },

    /// CTI command channel error
    #[error("CTI error: {message}")]
    Cti { message: String },
}

impl PhoneError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a signaling error for the named operation
    pub fn signaling(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Signaling {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Create a host media error
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    /// Create a CTI error
    pub fn cti(message: impl Into<String>) -> Self {
        Self::Cti {
            message: message.into(),
        }
    }

    /// Whether this error is a refused precondition rather than a failure
    /// reported by a collaborator
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::NotConnected
                | Self::NoFreeSlot { .. }
                | Self::InvalidSlot { .. }
                | Self::EmptySlot { .. }
                | Self::NoActiveCall
                | Self::InvalidDtmf { .. }
                | Self::MediaPlugBusy
                | Self::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(PhoneError::NotConnected.is_precondition());
        assert!(PhoneError::EmptySlot { slot: 1 }.is_precondition());
        assert!(!PhoneError::signaling("invite", "488 Not Acceptable Here").is_precondition());
        assert!(!PhoneError::cti("socket closed").is_precondition());
        assert!(!PhoneError::media("no such element").is_precondition());
    }

    #[test]
    fn test_messages() {
        let err = PhoneError::InvalidTransition {
            slot: 0,
            state: CallState::Calling,
            action: "hold",
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for slot 0: cannot hold while calling"
        );
        assert_eq!(
            PhoneError::NoFreeSlot { max_sessions: 2 }.to_string(),
            "All 2 call slots are in use"
        );
    }
}
