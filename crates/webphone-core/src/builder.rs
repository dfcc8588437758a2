//! Builder for [`CallController`]

use std::sync::Arc;

use crate::config::PhoneConfig;
use crate::controller::CallController;
use crate::cti::CtiChannel;
use crate::error::{PhoneError, PhoneResult};
use crate::media::MediaHost;
use crate::signaling::UserAgentFactory;

/// Assembles a [`CallController`] from its configuration and collaborators
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use webphone_core::*;
/// # async fn example(
/// #     stack: Arc<dyn UserAgentFactory>,
/// #     host: Arc<dyn MediaHost>,
/// #     cti: Arc<dyn CtiChannel>,
/// # ) -> PhoneResult<()> {
/// let phone = CallController::builder()
///     .config(PhoneConfig::new("alice", "example.com", "app.example.com").with_max_sessions(2))
///     .user_agent_factory(stack)
///     .media_host(host)
///     .cti(cti)
///     .build()?;
///
/// let worker = phone.clone();
/// tokio::spawn(async move { worker.run().await });
/// phone.init().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct CallControllerBuilder {
    config: Option<PhoneConfig>,
    factory: Option<Arc<dyn UserAgentFactory>>,
    media_host: Option<Arc<dyn MediaHost>>,
    cti: Option<Arc<dyn CtiChannel>>,
}

impl CallControllerBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (required)
    pub fn config(mut self, config: PhoneConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the signaling stack (required)
    pub fn user_agent_factory(mut self, factory: Arc<dyn UserAgentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the host media environment (required)
    pub fn media_host(mut self, host: Arc<dyn MediaHost>) -> Self {
        self.media_host = Some(host);
        self
    }

    /// Set the CTI command channel (required)
    pub fn cti(mut self, cti: Arc<dyn CtiChannel>) -> Self {
        self.cti = Some(cti);
        self
    }

    /// Validate and build the controller. Nothing is started until
    /// [`CallController::init`].
    pub fn build(self) -> PhoneResult<CallController> {
        let config = self
            .config
            .ok_or_else(|| PhoneError::config("configuration is required"))?;
        config.validate()?;

        let factory = self
            .factory
            .ok_or_else(|| PhoneError::config("a user agent factory is required"))?;
        let media_host = self
            .media_host
            .ok_or_else(|| PhoneError::config("a media host is required"))?;
        let cti = self
            .cti
            .ok_or_else(|| PhoneError::config("a CTI channel is required"))?;

        Ok(CallController::from_parts(config, factory, media_host, cti))
    }
}
