//! Controller configuration
//!
//! [`PhoneConfig`] carries the identity of the local user, the signaling
//! endpoint and the slot pool size, plus the tunables the controller passes
//! down to the signaling stack. It deserializes from the same JSON object a
//! hosting page would hand over:
//!
//! ```rust
//! use webphone_core::PhoneConfig;
//!
//! let config = PhoneConfig::from_json(r#"{
//!     "user_name": "alice",
//!     "domain_name": "example.com",
//!     "app_cname": "app.example.com",
//!     "max_sessions": 2
//! }"#).unwrap();
//!
//! assert_eq!(config.max_sessions, 2);
//! assert_eq!(config.refer_domain, "basix");
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PhoneError, PhoneResult};
use crate::signaling::{MediaConstraints, UserAgentSettings};

/// Default number of call slots
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default delay between media plug acceptance and flushing the queued command
pub const DEFAULT_MEDIA_PLUG_SETTLE_DELAY_MS: u64 = 2000;

/// Default per-subscriber event buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Header carrying the switch channel id on the media plug answer
pub const CHANNEL_UUID_HEADER: &str = "X-Channel-Uuid";

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneConfig {
    /// Local user name, used in the user agent URI and as REFER referrer
    pub user_name: String,
    /// SIP domain of the local user
    pub domain_name: String,
    /// Host name of the signaling endpoint
    pub app_cname: String,
    /// Number of call slots
    pub max_sessions: usize,
    /// Path of the WebSocket signaling endpoint on `app_cname`
    pub ws_path: String,
    /// Host part used in outbound INVITE request URIs
    pub invite_host: String,
    /// Domain appended to transfer targets
    pub refer_domain: String,
    /// User part of the media plug monitoring endpoint
    pub media_plug_user: String,
    /// Prefix of the audio sink element ids
    pub sink_prefix: String,
    /// Delay before a queued media plug command is flushed after acceptance
    pub media_plug_settle_delay_ms: u64,
    /// ICE checking timeout handed to the signaling stack
    pub ice_checking_timeout_ms: u64,
    /// No-answer timeout handed to the signaling stack
    pub no_answer_timeout_secs: u64,
    /// Registration expiry handed to the signaling stack
    pub register_expires_secs: u64,
    /// Capacity of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            domain_name: String::new(),
            app_cname: String::new(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            ws_path: "/basix/api/ws_sip".to_string(),
            invite_host: "anything".to_string(),
            refer_domain: "basix".to_string(),
            media_plug_user: "media_plug".to_string(),
            sink_prefix: "BasixWebPhoneRemoteAudio".to_string(),
            media_plug_settle_delay_ms: DEFAULT_MEDIA_PLUG_SETTLE_DELAY_MS,
            ice_checking_timeout_ms: 500,
            no_answer_timeout_secs: 180,
            register_expires_secs: 100,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PhoneConfig {
    /// Create a configuration for the given identity with default tunables
    pub fn new(
        user_name: impl Into<String>,
        domain_name: impl Into<String>,
        app_cname: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            domain_name: domain_name.into(),
            app_cname: app_cname.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON and validate it
    pub fn from_json(json: &str) -> PhoneResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PhoneError::config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of call slots
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Set the media plug settle delay
    pub fn with_media_plug_settle_delay(mut self, delay: Duration) -> Self {
        self.media_plug_settle_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the domain appended to transfer targets
    pub fn with_refer_domain(mut self, domain: impl Into<String>) -> Self {
        self.refer_domain = domain.into();
        self
    }

    /// Set the host part used in outbound INVITE request URIs
    pub fn with_invite_host(mut self, host: impl Into<String>) -> Self {
        self.invite_host = host.into();
        self
    }

    /// Set the audio sink element id prefix
    pub fn with_sink_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sink_prefix = prefix.into();
        self
    }

    /// Media plug settle delay as a [`Duration`]
    pub fn media_plug_settle_delay(&self) -> Duration {
        Duration::from_millis(self.media_plug_settle_delay_ms)
    }

    /// Check the configuration for values the controller cannot work with
    pub fn validate(&self) -> PhoneResult<()> {
        if self.user_name.is_empty() {
            return Err(PhoneError::config("user_name is required"));
        }
        if self.domain_name.is_empty() {
            return Err(PhoneError::config("domain_name is required"));
        }
        if self.app_cname.is_empty() {
            return Err(PhoneError::config("app_cname is required"));
        }
        if self.max_sessions == 0 {
            return Err(PhoneError::config("max_sessions must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(PhoneError::config("event_capacity must be at least 1"));
        }
        if !self.ws_path.starts_with('/') {
            return Err(PhoneError::config("ws_path must start with '/'"));
        }
        Ok(())
    }

    /// Request URI for an outbound call to `destination`
    pub fn call_uri(&self, destination: &str) -> String {
        format!("sip:{}@{}", destination, self.invite_host)
    }

    /// Request URI of the media plug monitoring endpoint
    pub fn media_plug_uri(&self) -> String {
        format!("sip:{}@{}", self.media_plug_user, self.invite_host)
    }

    /// REFER target for a transfer to `destination`
    pub fn refer_target(&self, destination: &str) -> String {
        format!("{}@{}", destination, self.refer_domain)
    }

    /// Element id of the audio sink for `slot`
    pub fn slot_sink_id(&self, slot: usize) -> String {
        format!("{}{}", self.sink_prefix, slot)
    }

    /// Element id of the monitoring audio sink
    pub fn media_plug_sink_id(&self) -> String {
        format!("{}MediaPlug", self.sink_prefix)
    }

    /// Settings for a new user agent
    pub fn user_agent_settings(&self) -> UserAgentSettings {
        UserAgentSettings {
            uri: format!("ws_sip_{}@{}", self.user_name, self.domain_name),
            ws_servers: vec![format!("wss://{}{}", self.app_cname, self.ws_path)],
            max_reconnection_attempts: 0,
            register: false,
            register_expires: Duration::from_secs(self.register_expires_secs),
            no_answer_timeout: Duration::from_secs(self.no_answer_timeout_secs),
            constraints: MediaConstraints::audio_only(),
            ice_checking_timeout: Duration::from_millis(self.ice_checking_timeout_ms),
        }
    }
}
