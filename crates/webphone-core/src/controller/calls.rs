//! Call operations: placing calls and controlling the calls in slots
//!
//! Every operation here takes the state lock for its whole duration, so a
//! command and the signaling events it provokes are never interleaved.

use tracing::{debug, error, info, warn};

use super::{CallController, CallSlot, PhoneState};
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneEvent;
use crate::session::{CallId, CallSession, CallState, SlotId, Trigger};
use crate::signaling::{InviteRequest, MediaConstraints};

/// Tones accepted by [`CallController::send_dtmf`]
const DTMF_TONES: &str = "0123456789*#ABCD";

impl CallController {
    /// Place an outbound call in the lowest free slot.
    ///
    /// Fails without consuming a slot when the transport is not connected
    /// or every slot is busy.
    ///
    /// ```rust,no_run
    /// # async fn example(phone: webphone_core::CallController) -> webphone_core::PhoneResult<()> {
    /// let slot = phone.make_call("100").await?;
    /// println!("calling 100 in slot {}", slot);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn make_call(&self, destination: &str) -> PhoneResult<SlotId> {
        let mut state = self.inner.state.lock().await;
        if !state.initialized {
            return Err(PhoneError::NotInitialized);
        }
        if !state.connected {
            warn!("Cannot make call as user agent is not connected");
            return Err(PhoneError::NotConnected);
        }
        let Some(slot) = state.lowest_free_slot() else {
            warn!("All slots in use");
            return Err(PhoneError::NoFreeSlot {
                max_sessions: self.max_sessions(),
            });
        };
        let agent = match state.agent.as_ref() {
            Some(handle) => handle.agent.clone(),
            None => return Err(PhoneError::NotConnected),
        };

        let config = &self.inner.config;
        let call_id = CallId::new();
        let request = InviteRequest {
            call_id,
            target: config.call_uri(destination),
            constraints: Some(MediaConstraints::audio_only()),
            render_target: Some(config.slot_sink_id(slot)),
        };
        debug!(slot, %call_id, target = %request.target, "Sending INVITE");
        let handle = agent.invite(request).await?;

        let session = CallSession::outbound(slot, call_id, destination);
        state.slots[slot] = Some(CallSlot {
            session: session.clone(),
            handle,
        });
        info!(slot, %call_id, "Calling {}", destination);
        self.emit(PhoneEvent::SessionUpdate(session));

        Ok(slot)
    }

    /// Put the call in `slot` on hold
    pub async fn hold(&self, slot: SlotId) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        self.hold_slot(&mut state, slot).await
    }

    /// Resume the call in `slot`, holding every other talking call and
    /// tearing down the media plug
    pub async fn unhold(&self, slot: SlotId) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        self.resume_slot(&mut state, slot).await
    }

    /// Hold a talking call or resume a held one. Any other state is left
    /// alone. Returns the state of the slot afterwards.
    pub async fn toggle_slot(&self, slot: SlotId) -> PhoneResult<CallState> {
        let mut state = self.inner.state.lock().await;
        let current = self.checked_call(&mut state, slot)?.session.state;

        match current {
            CallState::Talking => self.hold_slot(&mut state, slot).await?,
            CallState::OnHold => self.resume_slot(&mut state, slot).await?,
            other => {
                debug!(slot, state = %other, "Toggle ignored");
                return Ok(other);
            }
        }
        Ok(state
            .slots
            .get(slot)
            .and_then(Option::as_ref)
            .map(|call| call.session.state)
            .unwrap_or(CallState::Terminated))
    }

    /// Blind-transfer the call in `slot` to `destination`.
    ///
    /// The REFER outcome is not tracked; the call ends through the usual
    /// session events once the transfer completes.
    pub async fn transfer(&self, slot: SlotId, destination: &str) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        let call = self.checked_call(&mut state, slot)?;

        let config = &self.inner.config;
        let target = config.refer_target(destination);
        let headers = [format!("Referred-By: {}", config.user_name)];
        info!(slot, call_id = %call.session.call_id, "Transferring to {}", target);
        call.handle.refer(&target, &headers).await
    }

    /// Send a DTMF tone to the talking call
    pub async fn send_dtmf(&self, key: char) -> PhoneResult<SlotId> {
        let key = key.to_ascii_uppercase();
        if !DTMF_TONES.contains(key) {
            return Err(PhoneError::InvalidDtmf { key });
        }

        let state = self.inner.state.lock().await;
        let Some(call) = state
            .slots
            .iter()
            .flatten()
            .find(|call| call.session.state == CallState::Talking)
        else {
            debug!("No talking session for DTMF");
            return Err(PhoneError::NoActiveCall);
        };

        debug!(slot = call.session.slot, "Sending DTMF {}", key);
        call.handle.dtmf(key).await?;
        Ok(call.session.slot)
    }

    /// End the current call: the first slot, in slot order, that is
    /// talking, calling or in progress. Returns the slot terminated.
    pub async fn hangup_current_call(&self) -> PhoneResult<Option<SlotId>> {
        let state = self.inner.state.lock().await;
        let target = state.slots.iter().flatten().find(|call| {
            matches!(
                call.session.state,
                CallState::Talking | CallState::Calling | CallState::Progress
            )
        });

        let Some(call) = target else {
            debug!("No current call to hang up");
            return Ok(None);
        };

        info!(slot = call.session.slot, state = %call.session.state, "Hanging up");
        call.handle.terminate().await?;
        Ok(Some(call.session.slot))
    }

    fn checked_call<'a>(
        &self,
        state: &'a mut PhoneState,
        slot: SlotId,
    ) -> PhoneResult<&'a mut CallSlot> {
        state
            .call_mut(slot, self.max_sessions())
            .inspect_err(|e| warn!(slot, "{}", e))
    }

    async fn hold_slot(&self, state: &mut PhoneState, slot: SlotId) -> PhoneResult<()> {
        let call = self.checked_call(state, slot)?;
        check_transition(call, Trigger::Hold)?;

        call.handle.hold().await?;
        self.apply_slot_trigger(state, slot, Trigger::Hold);
        Ok(())
    }

    async fn resume_slot(&self, state: &mut PhoneState, slot: SlotId) -> PhoneResult<()> {
        let call = self.checked_call(state, slot)?;
        check_transition(call, Trigger::Resume)?;

        call.handle.unhold().await?;
        self.apply_slot_trigger(state, slot, Trigger::Resume);

        // one active audio path: everything else goes on hold
        let still_talking = self.hold_other_sessions(state, slot).await;
        if !still_talking.is_empty() {
            error!(slot, ?still_talking, "Resumed call shares audio with calls that could not be held");
        }
        self.teardown_media_plug(state, "call resumed").await;
        Ok(())
    }
}

fn check_transition(call: &CallSlot, trigger: Trigger) -> PhoneResult<()> {
    call.session
        .state
        .apply(trigger)
        .map(|_| ())
        .map_err(|invalid| PhoneError::InvalidTransition {
            slot: call.session.slot,
            state: invalid.from,
            action: invalid.trigger.action(),
        })
}
