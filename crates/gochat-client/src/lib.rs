//! GoChat client engine.
//!
//! Keeps one authenticated WebSocket session to the chat server alive:
//! handshake, ping/pong handling, periodic keep-alives and dispatch of chat
//! and room-presence messages to a [`MessageConsumer`].
//!
//! ```text
//! ConnectionManager::connect
//!        │ handshake
//!        ▼
//!   ┌──────────┐   frames   ┌───────────────────┐   events   ┌──────────┐
//!   │ listener │──────────▶│ MessageDispatcher │──────────▶│ consumer │
//!   └──────────┘           └───────────────────┘           └──────────┘
//!   ┌───────────┐
//!   │ heartbeat │  {"type":"pong"} every 25s
//!   └───────────┘
//! ```

pub mod auth;
pub mod auth_check;
pub mod dispatcher;
pub mod heartbeat;
pub mod listener;
pub mod manager;
pub mod state;
pub mod ws;

pub use auth::{AuthClient, AuthResponse, AuthRoutes, AuthSession};
pub use auth_check::{AuthCheckReport, CheckStep};
pub use dispatcher::{
    ChannelConsumer, ChatEvent, DynConsumer, LoggingConsumer, MessageConsumer, MessageDispatcher,
};
pub use heartbeat::HeartbeatSender;
pub use listener::MessageListener;
pub use manager::ConnectionManager;
pub use state::{ClientState, FailureBudget, SessionMetrics, SessionPhase};
pub use ws::{WsConnection, WsConnector};

// Core types most callers need alongside the engine.
pub use gochat_core::{ChatMessage, ClientConfig, Credentials, Error, Result, RoomInfo};
