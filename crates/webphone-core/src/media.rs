//! Host media plumbing
//!
//! The host environment owns the actual playback elements. The controller
//! asks a [`MediaHost`] for one sink per call slot and one for the media
//! plug at `init()`, then attaches remote tracks to them as the signaling
//! stack reports them.

use std::sync::Arc;

use crate::error::PhoneResult;
use crate::signaling::MediaTrack;

/// Creates audio sinks in the host environment
pub trait MediaHost: Send + Sync {
    /// Create a sink identified by `element_id`
    fn create_sink(&self, element_id: &str) -> PhoneResult<Arc<dyn AudioSink>>;
}

/// A playback element for remote audio
pub trait AudioSink: Send + Sync {
    /// Element id the sink was created with
    fn element_id(&self) -> &str;

    /// Replace the sink's source with `tracks` and start playback
    fn attach(&self, tracks: Vec<MediaTrack>) -> PhoneResult<()>;
}

/// Sinks allocated at init: one per slot plus the monitoring sink
#[derive(Clone)]
pub(crate) struct SinkSet {
    slots: Vec<Arc<dyn AudioSink>>,
    media_plug: Arc<dyn AudioSink>,
}

impl SinkSet {
    pub(crate) fn allocate(
        host: &dyn MediaHost,
        slot_ids: impl IntoIterator<Item = String>,
        media_plug_id: &str,
    ) -> PhoneResult<Self> {
        let slots = slot_ids
            .into_iter()
            .map(|id| host.create_sink(&id))
            .collect::<PhoneResult<Vec<_>>>()?;
        let media_plug = host.create_sink(media_plug_id)?;
        Ok(Self { slots, media_plug })
    }

    pub(crate) fn slot(&self, slot: usize) -> Option<&Arc<dyn AudioSink>> {
        self.slots.get(slot)
    }

    pub(crate) fn media_plug(&self) -> &Arc<dyn AudioSink> {
        &self.media_plug
    }
}
