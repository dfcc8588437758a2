//! Seam between the controller and the SIP/WebRTC signaling stack
//!
//! The controller never speaks SIP itself. A [`UserAgentFactory`] creates a
//! [`UserAgent`] for every transport start; the user agent places INVITEs
//! and returns a [`SignalingSession`] handle per call. Everything the stack
//! observes (transport connectivity, provisional and final responses, remote
//! media) flows back as [`SignalingEvent`]s through the
//! [`SignalingEventSink`] handed to the factory.
//!
//! Session events carry the [`CallId`] the controller put in the
//! [`InviteRequest`], so the controller can route them to the right slot
//! or to the media plug.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::PhoneResult;
use crate::session::CallId;

/// Media constraints requested for local capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// Settings used to create a user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentSettings {
    /// Local identity URI
    pub uri: String,
    /// WebSocket servers to connect to
    pub ws_servers: Vec<String>,
    /// Transport reconnection attempts; reconnection is left to the host
    pub max_reconnection_attempts: u32,
    /// Whether to REGISTER on start
    pub register: bool,
    /// Registration expiry
    pub register_expires: Duration,
    /// How long an unanswered INVITE may ring
    pub no_answer_timeout: Duration,
    /// Local capture constraints
    pub constraints: MediaConstraints,
    /// ICE candidate gathering timeout
    pub ice_checking_timeout: Duration,
}

/// An outbound INVITE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRequest {
    /// Id the stack must tag every event of this session with
    pub call_id: CallId,
    /// Request URI
    pub target: String,
    /// Local capture constraints, `None` for the stack's defaults
    pub constraints: Option<MediaConstraints>,
    /// Element id of the sink remote audio is rendered into
    pub render_target: Option<String>,
}

/// A media track received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Headers of a SIP message, keyed case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipHeaders {
    entries: HashMap<String, Vec<String>>,
}

impl SipHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `name`
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// First value of `name`
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `name`
    pub fn all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Transport connectivity changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Error { reason: String },
    Disconnected { reason: Option<String> },
}

/// Per-session signaling events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Provisional response
    Progress { status_code: u16 },
    /// Final 2xx response; carries the answer headers
    Accepted { headers: SipHeaders },
    /// Final non-2xx response from the remote side
    Rejected { status_code: u16, cause: String },
    /// Session could not be established
    Failed { cause: String },
    /// Session ended
    Terminated { cause: Option<String> },
    /// CANCEL received or sent
    Cancel,
    /// BYE received
    Bye,
    /// A remote media track became available
    TrackAdded,
}

impl SessionEvent {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Progress { .. } => "progress",
            SessionEvent::Accepted { .. } => "accepted",
            SessionEvent::Rejected { .. } => "rejected",
            SessionEvent::Failed { .. } => "failed",
            SessionEvent::Terminated { .. } => "terminated",
            SessionEvent::Cancel => "cancel",
            SessionEvent::Bye => "bye",
            SessionEvent::TrackAdded => "track_added",
        }
    }
}

/// Everything a user agent reports to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Transport(TransportEvent),
    /// The user agent unregistered
    Unregistered,
    Session { call_id: CallId, event: SessionEvent },
}

/// Event tagged with the user agent generation that produced it
#[derive(Debug, Clone)]
pub(crate) struct AgentEnvelope {
    pub generation: u64,
    pub event: SignalingEvent,
}

/// Handle a user agent uses to report events to the controller
///
/// Each sink is bound to one user agent generation. Events sent through a
/// sink whose user agent has been torn down are discarded by the controller.
#[derive(Debug, Clone)]
pub struct SignalingEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<AgentEnvelope>,
}

impl SignalingEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<AgentEnvelope>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the user agent this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event; returns `false` once the controller is gone
    pub fn emit(&self, event: SignalingEvent) -> bool {
        self.tx
            .send(AgentEnvelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Report a transport event
    pub fn transport(&self, event: TransportEvent) -> bool {
        self.emit(SignalingEvent::Transport(event))
    }

    /// Report a session event
    pub fn session(&self, call_id: CallId, event: SessionEvent) -> bool {
        self.emit(SignalingEvent::Session { call_id, event })
    }
}

/// Creates user agents
pub trait UserAgentFactory: Send + Sync {
    /// Create a user agent that reports through `sink`. The agent must not
    /// connect before [`UserAgent::start`] is called.
    fn create(
        &self,
        settings: UserAgentSettings,
        sink: SignalingEventSink,
    ) -> PhoneResult<Arc<dyn UserAgent>>;
}

/// A signaling user agent
#[async_trait]
pub trait UserAgent: Send + Sync {
    /// Connect the transport
    async fn start(&self) -> PhoneResult<()>;

    /// Disconnect and release the transport
    async fn stop(&self);

    /// Send an INVITE
    async fn invite(&self, request: InviteRequest) -> PhoneResult<Arc<dyn SignalingSession>>;
}

/// One call inside the signaling stack
#[async_trait]
pub trait SignalingSession: Send + Sync {
    /// Put the call on hold
    async fn hold(&self) -> PhoneResult<()>;

    /// Take the call off hold
    async fn unhold(&self) -> PhoneResult<()>;

    /// Blind transfer via REFER
    async fn refer(&self, target: &str, extra_headers: &[String]) -> PhoneResult<()>;

    /// Send a DTMF tone
    async fn dtmf(&self, tone: char) -> PhoneResult<()>;

    /// End the call, whatever its stage
    async fn terminate(&self) -> PhoneResult<()>;

    /// Tracks currently received from the remote peer
    fn remote_tracks(&self) -> Vec<MediaTrack>;
}
