//! Commands sent to the operator media switch over the CTI channel

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{PhoneError, PhoneResult};

/// A command for the media switch, addressed to a media plug channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MediaPlugCommand {
    /// Listen in on (or change the mode of listening to) channel `uuid`
    Eavesdrop { uuid: String, subcommand: String },
}

impl MediaPlugCommand {
    pub fn eavesdrop(uuid: impl Into<String>, subcommand: impl Into<String>) -> Self {
        MediaPlugCommand::Eavesdrop {
            uuid: uuid.into(),
            subcommand: subcommand.into(),
        }
    }

    /// Positional form understood by the switch: `["eavesdrop", uuid, subcommand]`
    pub fn to_args(&self) -> Vec<String> {
        match self {
            MediaPlugCommand::Eavesdrop { uuid, subcommand } => {
                vec!["eavesdrop".to_string(), uuid.clone(), subcommand.clone()]
            }
        }
    }
}

impl fmt::Display for MediaPlugCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

/// External command channel to the media switch
#[async_trait]
pub trait CtiChannel: Send + Sync {
    /// Send `command` for the media plug channel `media_plug_uuid`
    async fn send_media_plug_command(
        &self,
        media_plug_uuid: &str,
        command: &MediaPlugCommand,
    ) -> PhoneResult<()>;
}

struct CtiRequest {
    channel: String,
    command: MediaPlugCommand,
    reply: Option<oneshot::Sender<PhoneResult<()>>>,
}

/// Delivers media plug commands one at a time, in the order they were
/// queued, without the caller waiting on the channel while it holds the
/// controller state.
pub(crate) struct CtiQueue {
    tx: mpsc::UnboundedSender<CtiRequest>,
}

impl CtiQueue {
    /// Start the delivery task. It ends once every queue handle is dropped.
    pub(crate) fn spawn(cti: Arc<dyn CtiChannel>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CtiRequest>();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = cti
                    .send_media_plug_command(&request.channel, &request.command)
                    .await;
                match request.reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(channel = %request.channel, "Media plug command {} failed: {}", request.command, e);
                        }
                    }
                }
            }
            debug!("CTI queue closed");
        });
        Self { tx }
    }

    /// Queue a command; the returned receiver resolves with the send result
    pub(crate) fn send(
        &self,
        channel: String,
        command: MediaPlugCommand,
    ) -> oneshot::Receiver<PhoneResult<()>> {
        let (reply, rx) = oneshot::channel();
        let request = CtiRequest {
            channel,
            command,
            reply: Some(reply),
        };
        if let Err(mpsc::error::SendError(request)) = self.tx.send(request) {
            if let Some(reply) = request.reply {
                let _ = reply.send(Err(PhoneError::cti("command queue closed")));
            }
        }
        rx
    }

    /// Queue a command whose failure is only logged
    pub(crate) fn post(&self, channel: String, command: MediaPlugCommand) {
        let request = CtiRequest {
            channel,
            command,
            reply: None,
        };
        if self.tx.send(request).is_err() {
            warn!("CTI queue closed, dropping media plug command");
        }
    }
}

/// Wait for a queued command's result
pub(crate) async fn delivered(reply: oneshot::Receiver<PhoneResult<()>>) -> PhoneResult<()> {
    reply
        .await
        .map_err(|_| PhoneError::cti("command dropped before delivery"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eavesdrop_args() {
        let cmd = MediaPlugCommand::eavesdrop("chan-1", "whisper");
        assert_eq!(cmd.to_args(), vec!["eavesdrop", "chan-1", "whisper"]);
        assert_eq!(cmd.to_string(), "eavesdrop chan-1 whisper");
    }

    #[test]
    fn test_serialized_form() {
        let cmd = MediaPlugCommand::eavesdrop("chan-1", "listen");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command"], "eavesdrop");
        assert_eq!(json["uuid"], "chan-1");
        assert_eq!(json["subcommand"], "listen");
    }

    struct Recorder {
        sent: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CtiChannel for Recorder {
        async fn send_media_plug_command(
            &self,
            media_plug_uuid: &str,
            command: &MediaPlugCommand,
        ) -> PhoneResult<()> {
            // a slow channel must not reorder commands
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.sent
                .lock()
                .await
                .push(format!("{} {}", media_plug_uuid, command));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_queue_delivers_in_order() {
        let recorder = Arc::new(Recorder {
            sent: tokio::sync::Mutex::new(Vec::new()),
        });
        let queue = CtiQueue::spawn(recorder.clone());

        queue.post("sw".to_string(), MediaPlugCommand::eavesdrop("a", "listen"));
        let reply = queue.send("sw".to_string(), MediaPlugCommand::eavesdrop("b", "listen"));
        delivered(reply).await.unwrap();

        assert_eq!(
            *recorder.sent.lock().await,
            vec!["sw eavesdrop a listen", "sw eavesdrop b listen"]
        );
    }
}
