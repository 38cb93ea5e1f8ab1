//! Inbound frame loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use gochat_core::config::ClientConfig;
use gochat_core::connection::{Connection, DynConnection};
use gochat_core::error::{Error, Result};
use gochat_core::protocol::{self, InboundFrame, PONG_FRAME};

use crate::dispatcher::MessageDispatcher;
use crate::state::{ClientState, FailureBudget};

/// Receives frames, answers pings and dispatches application messages.
pub struct MessageListener {
    connection: DynConnection,
    state: Arc<ClientState>,
    dispatcher: Arc<MessageDispatcher>,
    receive_timeout: Option<Duration>,
    max_consecutive_errors: u32,
}

impl MessageListener {
    pub fn new(
        connection: DynConnection,
        state: Arc<ClientState>,
        dispatcher: Arc<MessageDispatcher>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            connection,
            state,
            dispatcher,
            receive_timeout: config.receive_timeout(),
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }

    /// Run until the session terminates.
    pub async fn run(self) {
        debug!("message listener started");
        let mut budget = FailureBudget::new(self.max_consecutive_errors);

        while self.state.is_running() {
            let received = tokio::select! {
                biased;
                _ = self.state.cancelled() => break,
                received = self.receive() => received,
            };

            let outcome = match received {
                Ok(Some(text)) => {
                    self.state.touch();
                    self.state.record_received();
                    self.handle_frame(&text).await
                }
                Ok(None) => {
                    info!("Connection closed by server");
                    self.state.stop();
                    break;
                }
                Err(Error::Timeout(ms)) => {
                    warn!(timeout_ms = ms, "no frame received within receive timeout");
                    continue;
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => budget.reset(),
                Err(e) => {
                    self.state.record_transport_error();
                    error!(error = %e, "Error in message listener");
                    if budget.record_failure() {
                        error!(
                            consecutive = budget.consecutive(),
                            "listener error budget exhausted, ending session"
                        );
                        self.state.stop();
                        break;
                    }
                }
            }
        }

        debug!("message listener exited");
    }

    async fn receive(&self) -> Result<Option<String>> {
        match self.receive_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connection.recv())
                .await
                .map_err(|_| Error::Timeout(limit.as_millis() as u64))?,
            None => self.connection.recv().await,
        }
    }

    /// Decode and act on one frame. Only transport writes can fail here.
    async fn handle_frame(&self, text: &str) -> Result<()> {
        match protocol::decode(text) {
            Ok(InboundFrame::Ping) => {
                self.connection.send(PONG_FRAME.to_string()).await?;
                self.state.touch();
                self.state.record_pong();
                debug!("Responded to ping with pong");
            }
            Ok(InboundFrame::Message(message)) => {
                self.dispatcher.dispatch(message, &self.state);
            }
            Err(e) => {
                self.state.record_malformed();
                warn!(error = %e, frame = %text, "Malformed frame received");
            }
        }
        Ok(())
    }
}
