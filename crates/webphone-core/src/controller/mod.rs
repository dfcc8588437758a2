//! The call controller
//!
//! [`CallController`] owns the slot table, the media plug and the running
//! user agent. All of that state sits behind one async mutex, so UI
//! commands, signaling events and the delayed media plug flush never
//! interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐       PhoneEvent (broadcast)
//! │     Hosting UI          │ ◄─────────────────────────────┐
//! └───────────┬─────────────┘                               │
//!             │ make_call / hold / transfer / eavesdrop ... │
//! ┌───────────▼─────────────┐                               │
//! │    CallController       │ ──────────────────────────────┘
//! │  slots │ media plug     │ ◄──── SignalingEvent (mpsc) ──┐
//! └───────────┬─────────────┘                               │
//!             │ invite / hold / refer / dtmf / terminate    │
//! ┌───────────▼─────────────┐                               │
//! │  UserAgent (injected)   │ ──────────────────────────────┘
//! └─────────────────────────┘
//! ```
//!
//! Signaling events are queued until the host processes them, either by
//! spawning [`CallController::run`] or by calling
//! [`CallController::drain_events`] from its own loop. The `run` task does
//! not keep the controller alive: it ends once the host drops its last
//! handle.

mod calls;
mod dispatch;
mod monitor;

use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::PhoneConfig;
use crate::cti::{CtiChannel, CtiQueue};
use crate::error::{PhoneError, PhoneResult};
use crate::events::{EventEmitter, EventIterator, EventStream, PhoneEvent};
use crate::media::{MediaHost, SinkSet};
use crate::media_plug::{MediaPlugState, MediaPlugStatus};
use crate::session::{CallId, CallSession, SlotId, Trigger};
use crate::signaling::{
    AgentEnvelope, SignalingEventSink, SignalingSession, UserAgent, UserAgentFactory,
};

/// Call-control facade over an injected signaling stack
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<Inner>,
}

struct Inner {
    config: PhoneConfig,
    factory: Arc<dyn UserAgentFactory>,
    media_host: Arc<dyn MediaHost>,
    cti: Arc<dyn CtiChannel>,
    events: EventEmitter,
    state: Mutex<PhoneState>,
    event_tx: mpsc::UnboundedSender<AgentEnvelope>,
    /// Taken by `run()`; `drain_events()` uses it in place
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<AgentEnvelope>>>,
    shutdown: Arc<Notify>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // stores a permit if `run()` is busy, so the wakeup is never lost
        self.shutdown.notify_one();
    }
}

/// A running user agent and the generation its events are tagged with
struct AgentHandle {
    generation: u64,
    agent: Arc<dyn UserAgent>,
}

/// A slot's session plus its signaling handle
pub(crate) struct CallSlot {
    pub(crate) session: CallSession,
    pub(crate) handle: Arc<dyn SignalingSession>,
}

#[derive(Default)]
pub(crate) struct PhoneState {
    initialized: bool,
    connected: bool,
    agent: Option<AgentHandle>,
    next_generation: u64,
    sinks: Option<SinkSet>,
    cti: Option<CtiQueue>,
    slots: Vec<Option<CallSlot>>,
    media_plug: MediaPlugState,
}

impl PhoneState {
    fn lowest_free_slot(&self) -> Option<SlotId> {
        self.slots.iter().position(Option::is_none)
    }

    fn slot_of(&self, call_id: CallId) -> Option<SlotId> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|call| call.session.call_id == call_id)
        })
    }

    fn call_mut(&mut self, slot: SlotId, max_sessions: usize) -> PhoneResult<&mut CallSlot> {
        if slot >= max_sessions {
            return Err(PhoneError::InvalidSlot { slot, max_sessions });
        }
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(PhoneError::EmptySlot { slot })
    }

    fn snapshots(&self) -> Vec<Option<CallSession>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(|call| call.session.clone()))
            .collect()
    }
}

impl CallController {
    /// Start building a controller
    pub fn builder() -> crate::builder::CallControllerBuilder {
        crate::builder::CallControllerBuilder::new()
    }

    pub(crate) fn from_parts(
        config: PhoneConfig,
        factory: Arc<dyn UserAgentFactory>,
        media_host: Arc<dyn MediaHost>,
        cti: Arc<dyn CtiChannel>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let events = EventEmitter::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                media_host,
                cti,
                events,
                state: Mutex::new(PhoneState::default()),
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// One-time setup: allocate the audio sinks and start the user agent.
    ///
    /// Calling it again logs a warning and does nothing.
    pub async fn init(&self) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.initialized {
            warn!("Call controller already initialized");
            return Ok(());
        }

        let config = &self.inner.config;
        info!(
            user = %config.user_name,
            domain = %config.domain_name,
            max_sessions = config.max_sessions,
            "Initializing call controller"
        );

        let sinks = SinkSet::allocate(
            self.inner.media_host.as_ref(),
            (0..config.max_sessions).map(|slot| config.slot_sink_id(slot)),
            &config.media_plug_sink_id(),
        )?;
        state.sinks = Some(sinks);
        state.cti = Some(CtiQueue::spawn(self.inner.cti.clone()));
        state.slots = (0..config.max_sessions).map(|_| None).collect();
        state.initialized = true;

        self.start_user_agent(&mut state).await
    }

    /// Start the user agent if none is running
    pub async fn start(&self) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        if !state.initialized {
            return Err(PhoneError::NotInitialized);
        }
        if state.agent.is_some() {
            debug!("User agent already running");
            return Ok(());
        }
        self.start_user_agent(&mut state).await
    }

    /// Stop the running user agent, tearing down its calls
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        self.teardown_agent(&mut state, "stopped by host").await;
    }

    async fn start_user_agent(&self, state: &mut PhoneState) -> PhoneResult<()> {
        state.connected = false;
        state.next_generation += 1;
        let generation = state.next_generation;

        let settings = self.inner.config.user_agent_settings();
        debug!(generation, uri = %settings.uri, "Starting user agent");

        let sink = SignalingEventSink::new(generation, self.inner.event_tx.clone());
        let agent = self.inner.factory.create(settings, sink)?;
        state.agent = Some(AgentHandle {
            generation,
            agent: agent.clone(),
        });

        if let Err(e) = agent.start().await {
            warn!(generation, "User agent failed to start: {}", e);
            state.agent = None;
            return Err(e);
        }

        info!(generation, "User agent started");
        Ok(())
    }

    /// Drop the user agent and everything that depended on it
    async fn teardown_agent(&self, state: &mut PhoneState, reason: &str) {
        let Some(handle) = state.agent.take() else {
            return;
        };
        info!(generation = handle.generation, reason, "Tearing down user agent");

        state.connected = false;
        handle.agent.stop().await;

        // the stopped agent will never report these calls ending
        for slot in state.slots.iter_mut() {
            if let Some(mut call) = slot.take() {
                if call.session.transition(Trigger::Terminated).is_ok() {
                    self.emit(PhoneEvent::SessionUpdate(call.session));
                }
            }
        }
        if state.media_plug.clear().is_some() {
            self.emit(PhoneEvent::MediaPlugTerminated);
        }

        self.emit(PhoneEvent::Stopped);
    }

    /// Process signaling events until every other handle to the controller
    /// has been dropped.
    ///
    /// Consumes its handle so the task holds the controller only while it
    /// handles an event. Meant to be spawned once; afterwards
    /// [`drain_events`](Self::drain_events) finds nothing to do.
    pub async fn run(self) {
        let Some(mut rx) = self.inner.event_rx.lock().await.take() else {
            warn!("Event loop already running");
            return;
        };
        let shutdown = self.inner.shutdown.clone();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        drop(self);
        debug!("Event loop started");

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                envelope = rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let Some(inner) = weak.upgrade() else { break };
                    CallController { inner }.handle_envelope(envelope).await;
                }
            }
        }
        debug!("Event loop finished");
    }

    /// Process every signaling event queued so far, including events
    /// queued while processing. Returns how many were handled.
    pub async fn drain_events(&self) -> usize {
        let mut rx = self.inner.event_rx.lock().await;
        let Some(rx) = rx.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(envelope) = rx.try_recv() {
            self.handle_envelope(envelope).await;
            handled += 1;
        }
        handled
    }

    pub(crate) fn emit(&self, event: PhoneEvent) {
        self.inner.events.emit(event);
    }

    /// Subscribe to controller events as a stream
    pub fn events(&self) -> EventStream {
        self.inner.events.stream()
    }

    /// Subscribe to controller events with a simple iterator
    pub fn subscribe(&self) -> EventIterator {
        self.inner.events.iter()
    }

    /// Configuration the controller was built with
    pub fn config(&self) -> &PhoneConfig {
        &self.inner.config
    }

    /// Number of call slots
    pub fn max_sessions(&self) -> usize {
        self.inner.config.max_sessions
    }

    /// Snapshot of every slot, indexed by slot id
    pub async fn sessions(&self) -> Vec<Option<CallSession>> {
        self.inner.state.lock().await.snapshots()
    }

    /// Snapshot of one slot
    pub async fn session(&self, slot: SlotId) -> Option<CallSession> {
        let state = self.inner.state.lock().await;
        state
            .slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|call| call.session.clone())
    }

    /// Whether the signaling transport is connected
    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Whether `init()` has run
    pub async fn is_initialized(&self) -> bool {
        self.inner.state.lock().await.initialized
    }

    /// Whether a user agent is running
    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.agent.is_some()
    }

    /// Channel id of the established media plug
    pub async fn media_plug_uuid(&self) -> Option<String> {
        let state = self.inner.state.lock().await;
        state.media_plug.uuid().map(str::to_string)
    }

    /// Current media plug status
    pub async fn media_plug_status(&self) -> MediaPlugStatus {
        self.inner.state.lock().await.media_plug.status()
    }
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("config", &self.inner.config)
            .field("subscribers", &self.inner.events.subscriber_count())
            .finish()
    }
}
