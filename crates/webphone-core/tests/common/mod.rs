//! In-memory collaborators for driving a `CallController` in tests
//!
//! `FakeStack` stands in for the signaling library: it records every user
//! agent it creates and every INVITE those agents send, and lets a test
//! inject transport and session events the way a real stack would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use webphone_core::{
    AudioSink, CallController, CallId, CtiChannel, InviteRequest, MediaHost, MediaPlugCommand,
    MediaTrack, PhoneConfig, PhoneError, PhoneEvent, PhoneResult, SessionEvent,
    SignalingEventSink, SignalingSession, SipHeaders, SlotId, TrackKind, TransportEvent,
    UserAgent, UserAgentFactory, UserAgentSettings,
};

/// Operations a fake session has been asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    Hold,
    Unhold,
    Refer { target: String, headers: Vec<String> },
    Dtmf(char),
    Terminate,
}

pub struct FakeSession {
    pub request: InviteRequest,
    ops: Mutex<Vec<SessionOp>>,
    tracks: Mutex<Vec<MediaTrack>>,
    hold_fails: Mutex<bool>,
}

impl FakeSession {
    fn new(request: InviteRequest) -> Self {
        Self {
            request,
            ops: Mutex::new(Vec::new()),
            tracks: Mutex::new(vec![MediaTrack {
                id: "remote-audio-0".to_string(),
                kind: TrackKind::Audio,
            }]),
            hold_fails: Mutex::new(false),
        }
    }

    /// Make every later hold request fail
    pub fn fail_holds(&self) {
        *self.hold_fails.lock() = true;
    }

    pub fn ops(&self) -> Vec<SessionOp> {
        self.ops.lock().clone()
    }

    pub fn was_terminated(&self) -> bool {
        self.ops().contains(&SessionOp::Terminate)
    }

    fn record(&self, op: SessionOp) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl SignalingSession for FakeSession {
    async fn hold(&self) -> PhoneResult<()> {
        if *self.hold_fails.lock() {
            return Err(PhoneError::signaling("hold", "491 Request Pending"));
        }
        self.record(SessionOp::Hold);
        Ok(())
    }

    async fn unhold(&self) -> PhoneResult<()> {
        self.record(SessionOp::Unhold);
        Ok(())
    }

    async fn refer(&self, target: &str, extra_headers: &[String]) -> PhoneResult<()> {
        self.record(SessionOp::Refer {
            target: target.to_string(),
            headers: extra_headers.to_vec(),
        });
        Ok(())
    }

    async fn dtmf(&self, tone: char) -> PhoneResult<()> {
        self.record(SessionOp::Dtmf(tone));
        Ok(())
    }

    async fn terminate(&self) -> PhoneResult<()> {
        self.record(SessionOp::Terminate);
        Ok(())
    }

    fn remote_tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().clone()
    }
}

pub struct FakeAgent {
    pub settings: UserAgentSettings,
    pub sink: SignalingEventSink,
    fail_start: bool,
    started: Mutex<bool>,
    stopped: Mutex<bool>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeAgent {
    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    pub fn invites(&self) -> Vec<InviteRequest> {
        self.sessions
            .lock()
            .iter()
            .map(|session| session.request.clone())
            .collect()
    }

    pub fn session(&self, call_id: CallId) -> Option<Arc<FakeSession>> {
        self.sessions
            .lock()
            .iter()
            .find(|session| session.request.call_id == call_id)
            .cloned()
    }

    pub fn last_session(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().last().cloned()
    }
}

#[async_trait]
impl UserAgent for FakeAgent {
    async fn start(&self) -> PhoneResult<()> {
        if self.fail_start {
            return Err(PhoneError::signaling("start", "WebSocket refused"));
        }
        *self.started.lock() = true;
        Ok(())
    }

    async fn stop(&self) {
        *self.stopped.lock() = true;
    }

    async fn invite(&self, request: InviteRequest) -> PhoneResult<Arc<dyn SignalingSession>> {
        let session = Arc::new(FakeSession::new(request));
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

#[derive(Default)]
pub struct FakeStack {
    agents: Mutex<Vec<Arc<FakeAgent>>>,
    fail_next_start: Mutex<bool>,
}

impl FakeStack {
    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    pub fn agent(&self) -> Arc<FakeAgent> {
        self.agents.lock().last().cloned().expect("no user agent created")
    }

    pub fn agent_at(&self, index: usize) -> Arc<FakeAgent> {
        self.agents.lock()[index].clone()
    }

    pub fn fail_next_start(&self) {
        *self.fail_next_start.lock() = true;
    }

    pub fn transport(&self, event: TransportEvent) {
        assert!(self.agent().sink.transport(event));
    }

    pub fn session_event(&self, call_id: CallId, event: SessionEvent) {
        assert!(self.agent().sink.session(call_id, event));
    }
}

impl UserAgentFactory for FakeStack {
    fn create(
        &self,
        settings: UserAgentSettings,
        sink: SignalingEventSink,
    ) -> PhoneResult<Arc<dyn UserAgent>> {
        let fail_start = std::mem::take(&mut *self.fail_next_start.lock());
        let agent = Arc::new(FakeAgent {
            settings,
            sink,
            fail_start,
            started: Mutex::new(false),
            stopped: Mutex::new(false),
            sessions: Mutex::new(Vec::new()),
        });
        self.agents.lock().push(agent.clone());
        Ok(agent)
    }
}

pub struct FakeSink {
    id: String,
    attached: Mutex<Vec<Vec<MediaTrack>>>,
}

impl FakeSink {
    pub fn attachments(&self) -> Vec<Vec<MediaTrack>> {
        self.attached.lock().clone()
    }
}

impl AudioSink for FakeSink {
    fn element_id(&self) -> &str {
        &self.id
    }

    fn attach(&self, tracks: Vec<MediaTrack>) -> PhoneResult<()> {
        self.attached.lock().push(tracks);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMediaHost {
    sinks: Mutex<HashMap<String, Arc<FakeSink>>>,
    order: Mutex<Vec<String>>,
}

impl FakeMediaHost {
    pub fn sink_ids(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    pub fn sink(&self, id: &str) -> Arc<FakeSink> {
        self.sinks.lock().get(id).cloned().expect("unknown sink")
    }
}

impl MediaHost for FakeMediaHost {
    fn create_sink(&self, element_id: &str) -> PhoneResult<Arc<dyn AudioSink>> {
        let sink = Arc::new(FakeSink {
            id: element_id.to_string(),
            attached: Mutex::new(Vec::new()),
        });
        self.sinks.lock().insert(element_id.to_string(), sink.clone());
        self.order.lock().push(element_id.to_string());
        Ok(sink)
    }
}

#[derive(Default)]
pub struct FakeCti {
    sent: Mutex<Vec<(String, MediaPlugCommand)>>,
    failing: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCti {
    pub fn sent(&self) -> Vec<(String, MediaPlugCommand)> {
        self.sent.lock().clone()
    }

    /// Make every later send fail
    pub fn fail_sends(&self) {
        *self.failing.lock() = true;
    }

    /// Make sends wait until the returned gate is notified, once per send
    pub fn hold_sends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl CtiChannel for FakeCti {
    async fn send_media_plug_command(
        &self,
        media_plug_uuid: &str,
        command: &MediaPlugCommand,
    ) -> PhoneResult<()> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.failing.lock() {
            return Err(PhoneError::cti("connection refused"));
        }
        self.sent
            .lock()
            .push((media_plug_uuid.to_string(), command.clone()));
        Ok(())
    }
}

/// Settle delay used by test configurations
pub const SETTLE_DELAY: Duration = Duration::from_millis(20);

/// Comfortably longer than [`SETTLE_DELAY`]
pub const AFTER_SETTLE: Duration = Duration::from_millis(150);

pub fn test_config(max_sessions: usize) -> PhoneConfig {
    PhoneConfig::new("alice", "example.com", "app.example.com")
        .with_max_sessions(max_sessions)
        .with_media_plug_settle_delay(SETTLE_DELAY)
}

pub struct Harness {
    pub phone: CallController,
    pub stack: Arc<FakeStack>,
    pub host: Arc<FakeMediaHost>,
    pub cti: Arc<FakeCti>,
}

impl Harness {
    /// Build a controller without initializing it
    pub fn new(max_sessions: usize) -> Self {
        let stack = Arc::new(FakeStack::default());
        let host = Arc::new(FakeMediaHost::default());
        let cti = Arc::new(FakeCti::default());
        let phone = CallController::builder()
            .config(test_config(max_sessions))
            .user_agent_factory(stack.clone())
            .media_host(host.clone())
            .cti(cti.clone())
            .build()
            .expect("valid test configuration");
        Self {
            phone,
            stack,
            host,
            cti,
        }
    }

    /// Build, init and connect
    pub async fn connected(max_sessions: usize) -> Self {
        let harness = Self::new(max_sessions);
        harness.phone.init().await.expect("init");
        harness.connect().await;
        harness
    }

    pub async fn connect(&self) {
        self.stack.transport(TransportEvent::Connected);
        self.phone.drain_events().await;
        assert!(self.phone.is_connected().await);
    }

    pub async fn call_id(&self, slot: SlotId) -> CallId {
        self.phone
            .session(slot)
            .await
            .unwrap_or_else(|| panic!("slot {} is empty", slot))
            .call_id
    }

    pub async fn fake_session(&self, slot: SlotId) -> Arc<FakeSession> {
        let call_id = self.call_id(slot).await;
        self.stack.agent().session(call_id).expect("session was invited")
    }

    /// Deliver a session event to the call in `slot` and process it
    pub async fn slot_event(&self, slot: SlotId, event: SessionEvent) {
        let call_id = self.call_id(slot).await;
        self.stack.session_event(call_id, event);
        self.phone.drain_events().await;
    }

    /// Place a call and have it answered
    pub async fn talking_call(&self, destination: &str) -> SlotId {
        let slot = self.phone.make_call(destination).await.expect("make_call");
        self.slot_event(slot, SessionEvent::Accepted { headers: SipHeaders::new() })
            .await;
        slot
    }

    /// Call id of the media plug session, from the last INVITE to the switch
    pub fn media_plug_call_id(&self) -> CallId {
        self.stack
            .agent()
            .invites()
            .iter()
            .rev()
            .find(|invite| invite.target.starts_with("sip:media_plug@"))
            .map(|invite| invite.call_id)
            .expect("no media plug invite")
    }

    pub async fn media_plug_event(&self, event: SessionEvent) {
        self.stack.session_event(self.media_plug_call_id(), event);
        self.phone.drain_events().await;
    }

    pub async fn accept_media_plug(&self, uuid: &str) {
        self.media_plug_event(SessionEvent::Accepted {
            headers: SipHeaders::new().with("X-Channel-Uuid", uuid),
        })
        .await;
    }
}

/// Everything emitted so far on `events`
pub fn drain(events: &mut webphone_core::EventIterator) -> Vec<PhoneEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.try_next() {
        out.push(event);
    }
    out
}

/// Session updates in `events` for `slot`
pub fn updates_for(events: &[PhoneEvent], slot: SlotId) -> Vec<webphone_core::CallState> {
    events
        .iter()
        .filter_map(|event| match event {
            PhoneEvent::SessionUpdate(session) if session.slot == slot => Some(session.state),
            _ => None,
        })
        .collect()
}
