//! Core types for the GoChat client.
//!
//! This crate defines the configuration, error type, wire protocol and
//! transport abstraction shared by the client engine and the CLI.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

pub use config::ClientConfig;
pub use connection::{Connection, Connector, DynConnection, DynConnector};
pub use error::{Error, Result};
pub use protocol::{ChatMessage, Credentials, InboundFrame, RoomInfo, ServerMessage};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{endpoints, env_vars, heartbeat, ClientConfig};

    // Error handling
    pub use crate::error::{Error, Result};

    // Protocol
    pub use crate::protocol::{
        decode, handshake_frame, msg_types, ChatMessage, Credentials, FrameError, InboundFrame,
        RoomInfo, ServerMessage, PONG_FRAME,
    };

    // Transport
    pub use crate::connection::{
        Connection, Connector, DynConnection, DynConnector, MemoryConnection, MemoryConnector,
        MemoryPeer,
    };
}
