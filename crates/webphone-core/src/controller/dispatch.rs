//! Translation of signaling events into slot and media plug state

use tracing::{debug, error, info, warn};

use super::{CallController, PhoneState};
use crate::config::CHANNEL_UUID_HEADER;
use crate::events::{PhoneEvent, UserWarning};
use crate::media_plug::MediaPlugStatus;
use crate::session::{CallId, CallState, SlotId, Trigger};
use crate::signaling::{AgentEnvelope, SessionEvent, SignalingEvent, TransportEvent};

impl CallController {
    pub(crate) async fn handle_envelope(&self, envelope: AgentEnvelope) {
        let mut state = self.inner.state.lock().await;

        let current = state.agent.as_ref().map(|agent| agent.generation);
        if current != Some(envelope.generation) {
            debug!(
                generation = envelope.generation,
                ?current,
                "Dropping event from stale user agent: {:?}",
                envelope.event
            );
            return;
        }

        match envelope.event {
            SignalingEvent::Transport(TransportEvent::Connected) => {
                info!("Transport connected");
                state.connected = true;
            }
            SignalingEvent::Transport(TransportEvent::Error { reason }) => {
                warn!("Transport error: {}", reason);
                self.teardown_agent(&mut state, "transport error").await;
            }
            SignalingEvent::Transport(TransportEvent::Disconnected { reason }) => {
                warn!(?reason, "Transport disconnected");
                self.teardown_agent(&mut state, "transport disconnected").await;
            }
            SignalingEvent::Unregistered => {
                info!("User agent unregistered");
                self.teardown_agent(&mut state, "unregistered").await;
            }
            SignalingEvent::Session { call_id, event } => {
                if let Some(slot) = state.slot_of(call_id) {
                    self.handle_slot_event(&mut state, slot, event).await;
                } else if state.media_plug.call_id() == Some(call_id) {
                    self.handle_media_plug_event(&mut state, call_id, event).await;
                } else {
                    debug!(%call_id, "Ignoring '{}' for unknown session", event.name());
                }
            }
        }
    }

    async fn handle_slot_event(&self, state: &mut PhoneState, slot: SlotId, event: SessionEvent) {
        debug!(slot, "Slot got event '{}'", event.name());

        match event {
            SessionEvent::Progress { status_code } => {
                debug!(slot, status_code, "Call progress");
                self.apply_slot_trigger(state, slot, Trigger::Progress);
            }
            SessionEvent::Accepted { .. } => {
                if self.apply_slot_trigger(state, slot, Trigger::Accepted).is_some() {
                    let still_talking = self.hold_other_sessions(state, slot).await;
                    if !still_talking.is_empty() {
                        error!(slot, ?still_talking, "Answered call shares audio with calls that could not be held");
                    }
                    self.teardown_media_plug(state, "call answered").await;
                }
            }
            SessionEvent::Rejected { status_code, cause } => {
                info!(slot, status_code, "Call rejected: {}", cause);
                self.apply_slot_trigger(state, slot, Trigger::Rejected);
            }
            SessionEvent::Cancel => {
                self.apply_slot_trigger(state, slot, Trigger::Cancelled);
            }
            SessionEvent::Failed { cause } => {
                info!(slot, "Call failed: {}", cause);
                self.apply_slot_trigger(state, slot, Trigger::Failed);
            }
            SessionEvent::Terminated { cause } => {
                info!(slot, ?cause, "Call terminated");
                self.apply_slot_trigger(state, slot, Trigger::Terminated);
            }
            SessionEvent::Bye => {}
            SessionEvent::TrackAdded => {
                let Some(call) = state.slots.get(slot).and_then(Option::as_ref) else {
                    return;
                };
                let tracks = call.handle.remote_tracks();
                let Some(sink) = state.sinks.as_ref().and_then(|sinks| sinks.slot(slot)) else {
                    warn!(slot, "No audio sink for slot");
                    return;
                };
                debug!(slot, tracks = tracks.len(), sink = sink.element_id(), "Attaching remote audio");
                if let Err(e) = sink.attach(tracks) {
                    warn!(slot, "Failed to attach remote audio: {}", e);
                }
            }
        }
    }

    /// Move a slot's session through `trigger`, emit the update and free
    /// the slot on termination. Returns the new state, or `None` when the
    /// transition was refused.
    pub(crate) fn apply_slot_trigger(
        &self,
        state: &mut PhoneState,
        slot: SlotId,
        trigger: Trigger,
    ) -> Option<CallState> {
        let call = state.slots.get_mut(slot)?.as_mut()?;

        let next = match call.session.transition(trigger) {
            Ok(next) => next,
            Err(invalid) => {
                warn!(
                    slot,
                    state = %invalid.from,
                    "Ignoring invalid transition: cannot {}",
                    invalid.trigger.action()
                );
                return None;
            }
        };

        debug!(slot, call_id = %call.session.call_id, state = %next, "Session state changed");
        self.emit(PhoneEvent::SessionUpdate(call.session.clone()));

        if next.is_terminal() {
            state.slots[slot] = None;
            info!(slot, "Slot freed");
        }
        Some(next)
    }

    /// Put every talking session except `active` on hold. Returns the slots
    /// whose hold failed; those stay `Talking`.
    pub(crate) async fn hold_other_sessions(
        &self,
        state: &mut PhoneState,
        active: SlotId,
    ) -> Vec<SlotId> {
        let mut failed = Vec::new();
        for slot in 0..state.slots.len() {
            if slot == active {
                continue;
            }
            let handle = match state.slots[slot].as_ref() {
                Some(call) if call.session.state == CallState::Talking => call.handle.clone(),
                _ => continue,
            };

            if let Err(e) = handle.hold().await {
                error!(slot, active, "Failed to hold session: {}", e);
                failed.push(slot);
                continue;
            }
            self.apply_slot_trigger(state, slot, Trigger::Hold);
        }
        failed
    }

    /// Terminate the media plug, if any. Returns whether one was there.
    pub(crate) async fn teardown_media_plug(&self, state: &mut PhoneState, reason: &str) -> bool {
        let Some(handle) = state.media_plug.clear() else {
            return false;
        };
        info!(reason, "Tearing down media plug");
        if let Err(e) = handle.terminate().await {
            warn!("Failed to terminate media plug: {}", e);
        }
        self.emit(PhoneEvent::MediaPlugTerminated);
        true
    }

    async fn handle_media_plug_event(
        &self,
        state: &mut PhoneState,
        call_id: CallId,
        event: SessionEvent,
    ) {
        debug!(%call_id, "Media plug got event '{}'", event.name());

        match event {
            SessionEvent::Accepted { headers } => {
                if !matches!(state.media_plug.status(), MediaPlugStatus::Pending) {
                    warn!("Media plug accepted twice");
                    return;
                }
                let Some(uuid) = headers.first(CHANNEL_UUID_HEADER).map(str::to_string) else {
                    error!("Media plug answer carries no {} header", CHANNEL_UUID_HEADER);
                    self.teardown_media_plug(state, "missing channel id").await;
                    return;
                };

                info!(%uuid, "Media plug established");
                let has_pending = state.media_plug.establish(uuid.clone());
                self.emit(PhoneEvent::MediaPlugEstablished { uuid });
                if has_pending {
                    self.schedule_media_plug_flush(call_id);
                }
            }
            SessionEvent::Failed { cause } => {
                warn!("Media plug failed: {}", cause);
                state.media_plug.clear();
                self.emit(PhoneEvent::MediaPlugFailed {
                    warning: UserWarning::MicrophoneAccess,
                    cause,
                });
            }
            SessionEvent::Terminated { cause } => {
                info!(?cause, "Media plug terminated");
                state.media_plug.clear();
                self.emit(PhoneEvent::MediaPlugTerminated);
            }
            SessionEvent::Rejected { status_code, cause } => {
                info!(status_code, "Media plug rejected: {}", cause);
            }
            SessionEvent::TrackAdded => {
                let Some(handle) = state.media_plug.handle() else {
                    return;
                };
                let tracks = handle.remote_tracks();
                let Some(sinks) = state.sinks.as_ref() else {
                    return;
                };
                if let Err(e) = sinks.media_plug().attach(tracks) {
                    warn!("Failed to attach media plug audio: {}", e);
                }
            }
            SessionEvent::Progress { .. } | SessionEvent::Cancel | SessionEvent::Bye => {}
        }
    }
}
