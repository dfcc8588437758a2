//! Events the controller publishes to the hosting UI

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::session::CallSession;

/// Warnings meant to be shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserWarning {
    /// The browser (or host) refused microphone access
    MicrophoneAccess,
}

impl UserWarning {
    /// Text suitable for a toast
    pub fn message(self) -> &'static str {
        match self {
            UserWarning::MicrophoneAccess => {
                "Could not start monitoring: please allow microphone access"
            }
        }
    }
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PhoneEvent {
    /// A slot's session was created or changed state
    SessionUpdate(CallSession),

    /// The user agent was torn down; call `start()` to reconnect
    Stopped,

    /// The media plug session ended
    MediaPlugTerminated,

    /// The media plug session was answered by the switch
    MediaPlugEstablished {
        /// Switch channel id
        uuid: String,
    },

    /// The media plug session could not be set up
    MediaPlugFailed {
        /// What to tell the user
        warning: UserWarning,
        /// Cause reported by the signaling stack
        cause: String,
    },
}

/// Subscription as a `Stream`; lagging shows up as `Err(Lagged)` items
pub type EventStream = BroadcastStream<PhoneEvent>;

/// Subscription read with plain `next().await`
///
/// Events dropped because the subscriber fell behind are skipped with a
/// warning.
pub struct EventIterator {
    rx: broadcast::Receiver<PhoneEvent>,
}

impl EventIterator {
    /// Wait for the next event. `None` once the controller is gone.
    pub async fn next(&mut self) -> Option<PhoneEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<PhoneEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Fan-out of [`PhoneEvent`]s to every subscriber
///
/// Holds at most `capacity` undelivered events per subscriber; a subscriber
/// that falls further behind loses the oldest ones.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PhoneEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish `event`. Returns how many subscribers it reached.
    pub fn emit(&self, event: PhoneEvent) -> usize {
        match self.tx.send(event) {
            Ok(reached) => reached,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(?event, "No subscriber for event");
                0
            }
        }
    }

    /// New subscription as a stream
    pub fn stream(&self) -> EventStream {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// New subscription as an [`EventIterator`]
    pub fn iter(&self) -> EventIterator {
        EventIterator {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
