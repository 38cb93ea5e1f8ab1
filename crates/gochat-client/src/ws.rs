//! WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use gochat_core::connection::{Connection, Connector, DynConnection};
use gochat_core::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    fn connector_type(&self) -> &str {
        "websocket"
    }

    async fn open(&self, endpoint: &str) -> Result<DynConnection> {
        let (stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("{}: {}", endpoint, e)))?;
        info!(
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket connection established"
        );
        Ok(Arc::new(WsConnection::new(stream)))
    }
}

/// An open WebSocket. Writes go through a mutex so frames never interleave.
///
/// A close frame from the server only marks the peer side closed; the sink
/// is still flushed by [`Connection::close`] so the close reply goes out.
pub struct WsConnection {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    open: AtomicBool,
    peer_closed: AtomicBool,
}

impl WsConnection {
    fn new(stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            open: AtomicBool::new(true),
            peer_closed: AtomicBool::new(false),
        }
    }

    fn mark_peer_closed(&self) {
        self.peer_closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, frame: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Text(frame)).await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                self.mark_peer_closed();
                Err(Error::NotConnected)
            }
            Err(e) => Err(Error::SendFailed(e.to_string())),
        }
    }

    async fn recv(&self) -> Result<Option<String>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                // Protocol-level ping/pong is answered by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "close frame received");
                    self.mark_peer_closed();
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    self.mark_peer_closed();
                    return Ok(None);
                }
                Some(Err(e)) => return Err(Error::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::CloseFailed(e.to_string())),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.peer_closed.load(Ordering::Acquire)
    }
}
