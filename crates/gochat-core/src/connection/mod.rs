//! Transport abstraction for message-oriented connections.
//!
//! A [`Connector`] opens a [`Connection`]; the connection moves whole text
//! frames. Protocol semantics live above this layer.
//!
//! ```text
//! ConnectionManager          Connection              Transport
//! ┌─────────────┐  frames   ┌─────────────┐  WS/    ┌──────────┐
//! │  listener   │◀──────────│             │◀────────│          │
//! │  heartbeat  │──────────▶│  WS/Memory  │────────▶│ Network  │
//! └─────────────┘           └─────────────┘         └──────────┘
//! ```
//!
//! Implementations must serialize concurrent `send` calls so that frames
//! from different tasks never interleave. Only one task calls `recv`.

pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

pub use memory::{MemoryConnection, MemoryConnector, MemoryPeer};

/// An open, message-oriented connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write one text frame.
    async fn send(&self, frame: String) -> Result<()>;

    /// Wait for the next text frame.
    ///
    /// `Ok(None)` means the peer closed the connection.
    async fn recv(&self) -> Result<Option<String>>;

    /// Close the connection. Closing a closed connection is a no-op.
    async fn close(&self) -> Result<()>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

/// Dynamic connection wrapper for trait objects.
pub type DynConnection = Arc<dyn Connection>;

/// Opens connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the connector type identifier.
    fn connector_type(&self) -> &str;

    /// Open a connection to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<DynConnection>;
}

/// Dynamic connector wrapper for trait objects.
pub type DynConnector = Arc<dyn Connector>;
