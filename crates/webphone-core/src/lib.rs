//! # webphone-core - call control for SIP/WebRTC phones
//!
//! This crate is the call-control layer of a web phone. It does not speak
//! SIP or negotiate media itself; those jobs belong to an injected signaling
//! stack and to the host's media environment. What it does own:
//!
//! - **Call slots**: a fixed pool of `max_sessions` slots, lowest free slot
//!   first, each holding at most one call
//! - **Call lifecycle**: a typed state machine per call (`calling`,
//!   `progress`, `talking`, `on hold`, `rejected`, `cancel`, `terminated`)
//!   driven by signaling events and re-published as `SessionUpdate` events
//! - **Call control**: hold, resume, blind transfer, DTMF and hangup, with a
//!   single active audio path (answering or resuming a call holds the rest)
//! - **Media plug**: one monitoring call to an operator media switch, used
//!   to eavesdrop through an external CTI channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webphone_core::*;
//!
//! # async fn example(
//! #     stack: Arc<dyn UserAgentFactory>,
//! #     host: Arc<dyn MediaHost>,
//! #     cti: Arc<dyn CtiChannel>,
//! # ) -> PhoneResult<()> {
//! let phone = CallController::builder()
//!     .config(PhoneConfig::new("alice", "example.com", "app.example.com"))
//!     .user_agent_factory(stack)
//!     .media_host(host)
//!     .cti(cti)
//!     .build()?;
//!
//! let mut events = phone.subscribe();
//! let worker = phone.clone();
//! tokio::spawn(async move { worker.run().await });
//!
//! phone.init().await?;
//! // ... once the transport reports it is connected:
//! let slot = phone.make_call("100").await?;
//!
//! while let Some(event) = events.next().await {
//!     if let PhoneEvent::SessionUpdate(session) = event {
//!         println!("slot {} is {}", session.slot, session.state);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Plugging in a signaling stack
//!
//! Implement [`UserAgentFactory`], [`UserAgent`] and [`SignalingSession`]
//! over the stack of your choice. Report transport and session events with
//! the [`SignalingEventSink`] the factory receives, tagging session events
//! with the [`CallId`] from the [`InviteRequest`].

pub mod builder;
pub mod config;
pub mod controller;
pub mod cti;
pub mod error;
pub mod events;
pub mod media;
pub mod media_plug;
pub mod session;
pub mod signaling;

pub use builder::CallControllerBuilder;
pub use config::PhoneConfig;
pub use controller::CallController;
pub use cti::{CtiChannel, MediaPlugCommand};
pub use error::{PhoneError, PhoneResult};
pub use events::{EventEmitter, EventIterator, EventStream, PhoneEvent, UserWarning};
pub use media::{AudioSink, MediaHost};
pub use media_plug::MediaPlugStatus;
pub use session::{CallDirection, CallId, CallSession, CallState, SlotId};
pub use signaling::{
    InviteRequest, MediaConstraints, MediaTrack, SessionEvent, SignalingEvent,
    SignalingEventSink, SignalingSession, SipHeaders, TrackKind, TransportEvent, UserAgent,
    UserAgentFactory, UserAgentSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
