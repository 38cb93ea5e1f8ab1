//! In-memory connection backed by channels.
//!
//! [`MemoryConnection::pair`] returns the client half and a [`MemoryPeer`]
//! that plays the server: it pushes inbound frames, observes outbound frames,
//! injects receive errors and closes the connection.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Connection, Connector, DynConnection};
use crate::error::{Error, Result};

enum PeerEvent {
    Frame(String),
    Error(String),
    Close,
}

/// Client half of an in-memory connection.
pub struct MemoryConnection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<PeerEvent>>,
    open: AtomicBool,
    fail_sends: Arc<AtomicBool>,
}

/// Server half of an in-memory connection.
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<PeerEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
}

impl MemoryConnection {
    /// Create a connected client/peer pair.
    pub fn pair() -> (Arc<MemoryConnection>, MemoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));

        let connection = Arc::new(MemoryConnection {
            outbound: outbound_tx,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            open: AtomicBool::new(true),
            fail_sends: fail_sends.clone(),
        });
        let peer = MemoryPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
            fail_sends,
        };
        (connection, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, frame: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(Error::SendFailed("write refused by peer".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| Error::SendFailed("peer dropped".to_string()))
    }

    async fn recv(&self) -> Result<Option<String>> {
        if !self.is_open() {
            return Ok(None);
        }
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(PeerEvent::Frame(text)) => Ok(Some(text)),
            Some(PeerEvent::Error(message)) => Err(Error::ReceiveFailed(message)),
            Some(PeerEvent::Close) | None => {
                self.open.store(false, Ordering::Release);
                Ok(None)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl MemoryPeer {
    /// Deliver a text frame to the client. Returns `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.inbound.send(PeerEvent::Frame(text.into())).is_ok()
    }

    /// Deliver a JSON frame to the client.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(value.to_string())
    }

    /// Make the client's next `recv` fail.
    pub fn inject_error(&self, message: impl Into<String>) -> bool {
        self.inbound.send(PeerEvent::Error(message.into())).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(&self) -> bool {
        self.inbound.send(PeerEvent::Close).is_ok()
    }

    /// Make client writes fail (or succeed again).
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// Wait for the next frame written by the client.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Take the next frame written by the client, if one is queued.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Take every queued frame written by the client.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Connector handing out a prepared in-memory connection.
pub struct MemoryConnector {
    connection: Mutex<Option<DynConnection>>,
    refusal: Option<String>,
}

impl MemoryConnector {
    /// Connector whose first `open` returns `connection`.
    pub fn new(connection: DynConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            refusal: None,
        }
    }

    /// Connector whose `open` always fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            connection: Mutex::new(None),
            refusal: Some(reason.into()),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn connector_type(&self) -> &str {
        "memory"
    }

    async fn open(&self, endpoint: &str) -> Result<DynConnection> {
        if let Some(reason) = &self.refusal {
            return Err(Error::ConnectionFailed(format!("{}: {}", endpoint, reason)));
        }
        self.connection
            .lock()
            .take()
            .ok_or_else(|| {
                Error::ConnectionFailed(format!("{}: connection already taken", endpoint))
            })
    }
}
