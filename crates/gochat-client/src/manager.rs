//! Session orchestration.
//!
//! [`ConnectionManager::connect`] opens the transport, sends the handshake
//! and then drives the listener and heartbeat until the session ends. It is
//! meant to be shared (`Arc<ConnectionManager>`) so another task can call
//! [`ConnectionManager::disconnect`] or [`ConnectionManager::send_message`]
//! while `connect` is suspended.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use gochat_core::config::ClientConfig;
use gochat_core::connection::{Connection, DynConnection, DynConnector};
use gochat_core::error::{Error, Result};
use gochat_core::protocol::{self, Credentials};

use crate::dispatcher::{DynConsumer, MessageDispatcher};
use crate::heartbeat::HeartbeatSender;
use crate::listener::MessageListener;
use crate::state::{ClientState, SessionMetrics, SessionPhase};
use crate::ws::WsConnector;

/// Owns the connection and the shared session state.
pub struct ConnectionManager {
    connector: DynConnector,
    config: ClientConfig,
    state: Arc<ClientState>,
    dispatcher: Arc<MessageDispatcher>,
    connection: Mutex<Option<DynConnection>>,
}

impl ConnectionManager {
    pub fn new(connector: DynConnector, config: ClientConfig, consumer: DynConsumer) -> Self {
        Self {
            connector,
            config,
            state: Arc::new(ClientState::new()),
            dispatcher: Arc::new(MessageDispatcher::new(consumer)),
            connection: Mutex::new(None),
        }
    }

    /// Manager using the WebSocket transport.
    pub fn websocket(config: ClientConfig, consumer: DynConsumer) -> Self {
        Self::new(Arc::new(WsConnector::new()), config, consumer)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.state.metrics()
    }

    /// Run one session against `endpoint`.
    ///
    /// Returns once both loops have stopped. Only failures before the loops
    /// start are reported as errors.
    pub async fn connect(&self, endpoint: &str, credentials: &Credentials) -> Result<()> {
        match self.state.phase() {
            SessionPhase::Disconnected => {}
            SessionPhase::Terminated => return Err(Error::SessionTerminated),
            SessionPhase::Pending | SessionPhase::Connected => return Err(Error::AlreadyConnected),
        }

        let connection = match self.connector.open(endpoint).await {
            Ok(connection) => connection,
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Connection error");
                self.state.terminate();
                return Err(e);
            }
        };

        let admitted = {
            let mut slot = self.connection.lock();
            if slot.is_some() {
                Err(Error::AlreadyConnected)
            } else if self.state.phase() == SessionPhase::Terminated {
                Err(Error::SessionTerminated)
            } else {
                *slot = Some(connection.clone());
                Ok(())
            }
        };
        match admitted {
            Ok(()) => {}
            Err(Error::SessionTerminated) => {
                info!("disconnect requested while opening connection");
                let _ = connection.close().await;
                return Ok(());
            }
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        }

        if let Err(e) = self.send_handshake(&connection, credentials).await {
            let cancelled = e.is_closed() && self.state.phase() == SessionPhase::Terminated;
            self.state.terminate();
            self.close_connection().await;
            if cancelled {
                info!("disconnect requested during handshake");
                return Ok(());
            }
            error!(endpoint = %endpoint, error = %e, "Connection error");
            return Err(e);
        }
        info!(
            user_id = credentials.user_id,
            room_id = credentials.room_id,
            "Connection request sent"
        );

        if !self.state.begin() {
            info!("disconnect requested before session start");
            self.close_connection().await;
            return Ok(());
        }

        let listener = MessageListener::new(
            connection.clone(),
            self.state.clone(),
            self.dispatcher.clone(),
            &self.config,
        );
        let heartbeat = HeartbeatSender::new(connection, self.state.clone(), &self.config);

        tokio::join!(
            self.supervise("listener", tokio::spawn(listener.run())),
            self.supervise("heartbeat", tokio::spawn(heartbeat.run())),
        );

        self.close_connection().await;
        info!(room_id = credentials.room_id, "Session ended");
        Ok(())
    }

    async fn send_handshake(
        &self,
        connection: &DynConnection,
        credentials: &Credentials,
    ) -> Result<()> {
        let frame = protocol::handshake_frame(credentials)?;
        connection.send(frame).await?;
        self.state.touch();
        self.state.record_sent();
        Ok(())
    }

    /// Await a loop task; a panicked loop takes the session down with it.
    async fn supervise(&self, name: &'static str, handle: JoinHandle<()>) {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "session task failed");
            self.state.terminate();
        }
    }

    /// End the session and close the connection. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        if self.state.terminate() {
            info!("Disconnecting from server...");
        }
        self.close_connection().await;
    }

    async fn close_connection(&self) {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "error while closing connection");
            } else {
                debug!("connection closed");
            }
        }
    }

    /// Send an application payload.
    ///
    /// Returns `Ok(false)` without writing anything when the server has not
    /// accepted the handshake.
    pub async fn send_message<T: Serialize + ?Sized>(&self, payload: &T) -> Result<bool> {
        if !self.state.is_connected() {
            warn!("Cannot send message: Not connected");
            return Ok(false);
        }
        let connection = self.connection.lock().clone();
        let Some(connection) = connection else {
            warn!("Cannot send message: Not connected");
            return Ok(false);
        };

        let frame = serde_json::to_string(payload)?;
        connection.send(frame).await?;
        self.state.touch();
        self.state.record_sent();
        Ok(true)
    }
}
