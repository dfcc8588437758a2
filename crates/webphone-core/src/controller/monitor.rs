//! Media plug operations: the operator monitoring channel

use tracing::{debug, info, warn};

use super::{CallController, PhoneState};
use crate::cti::{self, MediaPlugCommand};
use crate::error::{PhoneError, PhoneResult};
use crate::media_plug::{MediaPlugState, Submission};
use crate::session::CallId;
use crate::signaling::InviteRequest;

impl CallController {
    /// Call the media switch to open the monitoring channel
    pub async fn make_media_plug_call(&self) -> PhoneResult<()> {
        let mut state = self.inner.state.lock().await;
        self.start_media_plug(&mut state).await
    }

    /// Eavesdrop on switch channel `uuid`.
    ///
    /// Without a media plug one is created and the command waits until the
    /// switch answers. While it waits, a newer command replaces the queued
    /// one. Once the media plug is up the command goes straight to the CTI
    /// channel.
    pub async fn eavesdrop(&self, uuid: &str, subcommand: &str) -> PhoneResult<()> {
        let command = MediaPlugCommand::eavesdrop(uuid, subcommand);
        info!("Eavesdrop {}", command);

        let mut state = self.inner.state.lock().await;
        match state.media_plug.submit(command.clone()) {
            Submission::NeedsSession => {
                if let Err(e) = self.start_media_plug(&mut state).await {
                    warn!("Could not create media plug for eavesdrop: {}", e);
                    return Err(e);
                }
                state.media_plug.queue(command);
                debug!("Eavesdrop queued until media plug is established");
                Ok(())
            }
            Submission::Queued => {
                debug!("Media plug pending, eavesdrop queued");
                Ok(())
            }
            Submission::SendNow(channel) => {
                debug!(%channel, "Sending media plug command");
                let Some(queue) = state.cti.as_ref() else {
                    return Err(PhoneError::NotInitialized);
                };
                let reply = queue.send(channel, command);
                drop(state);
                cti::delivered(reply).await
            }
        }
    }

    /// Terminate the media plug. Returns whether there was one.
    pub async fn disconnect_media_plug(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        self.teardown_media_plug(&mut state, "disconnected by host").await
    }

    async fn start_media_plug(&self, state: &mut PhoneState) -> PhoneResult<()> {
        if !state.initialized {
            return Err(PhoneError::NotInitialized);
        }
        if !state.connected {
            warn!("Cannot make media plug call as user agent is not connected");
            return Err(PhoneError::NotConnected);
        }
        if !state.media_plug.is_absent() {
            return Err(PhoneError::MediaPlugBusy);
        }
        let agent = match state.agent.as_ref() {
            Some(handle) => handle.agent.clone(),
            None => return Err(PhoneError::NotConnected),
        };

        let config = &self.inner.config;
        let call_id = CallId::new();
        let request = InviteRequest {
            call_id,
            target: config.media_plug_uri(),
            constraints: None,
            render_target: Some(config.media_plug_sink_id()),
        };
        let handle = agent.invite(request).await?;
        state.media_plug = MediaPlugState::pending(call_id, handle);
        info!(%call_id, "Media plug call started");
        Ok(())
    }

    /// Send the queued command once the switch has settled
    pub(crate) fn schedule_media_plug_flush(&self, call_id: CallId) {
        let controller = self.clone();
        let delay = self.inner.config.media_plug_settle_delay();
        debug!(?delay, "Scheduling media plug command flush");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.flush_media_plug(call_id).await;
        });
    }

    async fn flush_media_plug(&self, call_id: CallId) {
        let mut state = self.inner.state.lock().await;
        let Some((channel, command)) = state.media_plug.take_flush(call_id) else {
            debug!(%call_id, "Nothing to flush for media plug");
            return;
        };
        let Some(queue) = state.cti.as_ref() else {
            warn!("No CTI queue, dropping pending media plug command");
            return;
        };

        // queued under the lock so a later eavesdrop is delivered after it
        info!(%channel, "Sending pending media plug command {}", command);
        queue.post(channel, command);
    }
}
