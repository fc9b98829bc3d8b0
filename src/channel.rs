use crate::connection::ConnectionManager;
use crate::error::{KefError, Result};
use crate::protocol::{CodecVersion, Command, RESPONSE_OK};
use crate::retry::RetryPolicy;
use crate::types::Reply;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Funnels commands through the connection manager one at a time
///
/// The protocol has no request ids, so a reply can only be matched to its
/// command if nothing else is on the wire. Each attempt (re)connects as
/// needed and is retried under the command retry policy.
pub struct CommandChannel {
    manager: Arc<ConnectionManager>,
    codec: CodecVersion,
    retry: RetryPolicy,
    in_flight: Mutex<()>,
}

impl CommandChannel {
    pub fn new(manager: Arc<ConnectionManager>, codec: CodecVersion, retry: RetryPolicy) -> Self {
        Self {
            manager,
            codec,
            retry,
            in_flight: Mutex::new(()),
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn codec(&self) -> CodecVersion {
        self.codec
    }

    /// Send a command and return the reply byte
    pub async fn send(&self, command: Command) -> Result<Reply> {
        let message = self.codec.encode(&command)?;
        self.retry
            .run(command.name(), || self.send_once(&message))
            .await
    }

    /// Send a write-type command and require the OK status
    pub async fn send_expecting_ok(&self, command: Command) -> Result<()> {
        let reply = self.send(command).await?;
        if reply.value() != RESPONSE_OK {
            return Err(KefError::UnexpectedReply {
                command: command.name(),
                reply: reply.value(),
            });
        }
        Ok(())
    }

    async fn send_once(&self, message: &[u8]) -> Result<Reply> {
        let _in_flight = self.in_flight.lock().await;
        self.manager.ensure_connected().await?;
        let reply = self.manager.exchange(message).await?;
        tracing::debug!("Received: {}", reply.value());
        Ok(reply)
    }
}
