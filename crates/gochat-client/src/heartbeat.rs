//! Periodic keep-alive sender.
//!
//! The server drops connections idle for 60s; a `{"type":"pong"}` frame
//! every 25s keeps this one open. Keep-alives do not count as activity, so
//! the idle warning reflects how long the server has been silent.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use gochat_core::config::ClientConfig;
use gochat_core::connection::{Connection, DynConnection};
use gochat_core::protocol::PONG_FRAME;

use crate::state::{ClientState, FailureBudget};

pub struct HeartbeatSender {
    connection: DynConnection,
    state: Arc<ClientState>,
    interval: Duration,
    idle_warning: Duration,
    max_consecutive_errors: u32,
}

impl HeartbeatSender {
    pub fn new(connection: DynConnection, state: Arc<ClientState>, config: &ClientConfig) -> Self {
        Self {
            connection,
            state,
            interval: config.heartbeat_interval(),
            idle_warning: config.idle_warning(),
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }

    /// Run until the session terminates.
    pub async fn run(self) {
        debug!(interval_secs = self.interval.as_secs(), "heartbeat sender started");
        let mut budget = FailureBudget::new(self.max_consecutive_errors);

        while self.state.is_running() {
            tokio::select! {
                biased;
                _ = self.state.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if !self.state.is_running() {
                break;
            }

            let idle = self.state.idle_for();
            if idle > self.idle_warning {
                self.state.record_idle_warning();
                warn!(
                    idle_secs = idle.as_secs(),
                    "Connection seems inactive, sending keep-alive"
                );
            }

            match self.connection.send(PONG_FRAME.to_string()).await {
                Ok(()) => {
                    budget.reset();
                    self.state.record_keepalive();
                    debug!("Sent heartbeat pong");
                }
                Err(e) if e.is_closed() => {
                    debug!(error = %e, "connection gone, stopping heartbeat");
                    self.state.stop();
                    break;
                }
                Err(e) => {
                    self.state.record_transport_error();
                    error!(error = %e, "Error in heartbeat sender");
                    if budget.record_failure() {
                        error!(
                            consecutive = budget.consecutive(),
                            "heartbeat error budget exhausted, ending session"
                        );
                        self.state.stop();
                        break;
                    }
                }
            }
        }

        debug!("heartbeat sender exited");
    }
}
