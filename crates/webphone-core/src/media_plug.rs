//! Media plug (operator monitoring) session state
//!
//! The media plug is a single call to the media switch used for
//! eavesdropping. It is never slot-indexed. Commands for it are sent over
//! the CTI channel once the switch has told us the channel id; until then at
//! most one command waits in `pending`, and a newer command replaces it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cti::MediaPlugCommand;
use crate::session::CallId;
use crate::signaling::SignalingSession;

/// Public view of the media plug
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaPlugStatus {
    Absent,
    Pending,
    Established { uuid: String },
}

/// What [`MediaPlugState::submit`] decided to do with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Submission {
    /// No media plug exists; the caller has to create one
    NeedsSession,
    /// Stored until the session is established (or the settle delay ends)
    Queued,
    /// Send now to this channel
    SendNow(String),
}

pub(crate) enum MediaPlugState {
    Absent,
    Pending {
        call_id: CallId,
        handle: Arc<dyn SignalingSession>,
        pending: Option<MediaPlugCommand>,
    },
    Established {
        call_id: CallId,
        handle: Arc<dyn SignalingSession>,
        uuid: String,
        /// Set while a flush is scheduled
        pending: Option<MediaPlugCommand>,
    },
}

impl Default for MediaPlugState {
    fn default() -> Self {
        MediaPlugState::Absent
    }
}

impl MediaPlugState {
    pub(crate) fn pending(call_id: CallId, handle: Arc<dyn SignalingSession>) -> Self {
        MediaPlugState::Pending {
            call_id,
            handle,
            pending: None,
        }
    }

    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, MediaPlugState::Absent)
    }

    pub(crate) fn call_id(&self) -> Option<CallId> {
        match self {
            MediaPlugState::Absent => None,
            MediaPlugState::Pending { call_id, .. } | MediaPlugState::Established { call_id, .. } => {
                Some(*call_id)
            }
        }
    }

    pub(crate) fn handle(&self) -> Option<&Arc<dyn SignalingSession>> {
        match self {
            MediaPlugState::Absent => None,
            MediaPlugState::Pending { handle, .. } | MediaPlugState::Established { handle, .. } => {
                Some(handle)
            }
        }
    }

    pub(crate) fn uuid(&self) -> Option<&str> {
        match self {
            MediaPlugState::Established { uuid, .. } => Some(uuid),
            _ => None,
        }
    }

    pub(crate) fn status(&self) -> MediaPlugStatus {
        match self {
            MediaPlugState::Absent => MediaPlugStatus::Absent,
            MediaPlugState::Pending { .. } => MediaPlugStatus::Pending,
            MediaPlugState::Established { uuid, .. } => MediaPlugStatus::Established {
                uuid: uuid.clone(),
            },
        }
    }

    /// Route a command: queue it, send it, or ask for a session
    pub(crate) fn submit(&mut self, command: MediaPlugCommand) -> Submission {
        match self {
            MediaPlugState::Absent => Submission::NeedsSession,
            MediaPlugState::Pending { pending, .. } => {
                *pending = Some(command);
                Submission::Queued
            }
            // a flush is still scheduled; it picks up the newest command
            MediaPlugState::Established { pending: pending @ Some(_), .. } => {
                *pending = Some(command);
                Submission::Queued
            }
            MediaPlugState::Established { uuid, .. } => Submission::SendNow(uuid.clone()),
        }
    }

    /// Queue a command on a session that is being created
    pub(crate) fn queue(&mut self, command: MediaPlugCommand) {
        if let MediaPlugState::Pending { pending, .. } = self {
            *pending = Some(command);
        }
    }

    /// Move `Pending` to `Established`. Returns whether a command is waiting
    /// to be flushed.
    pub(crate) fn establish(&mut self, uuid: String) -> bool {
        match std::mem::take(self) {
            MediaPlugState::Pending {
                call_id,
                handle,
                pending,
            } => {
                let has_pending = pending.is_some();
                *self = MediaPlugState::Established {
                    call_id,
                    handle,
                    uuid,
                    pending,
                };
                has_pending
            }
            other => {
                *self = other;
                false
            }
        }
    }

    /// Take the command waiting for the flush of session `call_id`, together
    /// with the channel id to send it to
    pub(crate) fn take_flush(&mut self, expected: CallId) -> Option<(String, MediaPlugCommand)> {
        match self {
            MediaPlugState::Established {
                call_id,
                uuid,
                pending,
                ..
            } if *call_id == expected => pending.take().map(|cmd| (uuid.clone(), cmd)),
            _ => None,
        }
    }

    /// Clear the state, returning the handle of the session that was there
    pub(crate) fn clear(&mut self) -> Option<Arc<dyn SignalingSession>> {
        match std::mem::take(self) {
            MediaPlugState::Absent => None,
            MediaPlugState::Pending { handle, .. } | MediaPlugState::Established { handle, .. } => {
                Some(handle)
            }
        }
    }
}
