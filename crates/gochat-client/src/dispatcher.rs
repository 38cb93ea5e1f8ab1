//! Routing of application frames to state changes and consumers.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gochat_core::protocol::{ChatMessage, RoomInfo, ServerMessage};

use crate::state::ClientState;

/// Receives application payloads forwarded by the dispatcher.
///
/// Called from the listener task; implementations must not block.
pub trait MessageConsumer: Send + Sync {
    fn on_chat_message(&self, message: &ChatMessage);

    fn on_room_info(&self, info: &RoomInfo);
}

/// Dynamic consumer wrapper for trait objects.
pub type DynConsumer = Arc<dyn MessageConsumer>;

/// Consumer that only writes log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingConsumer;

impl MessageConsumer for LoggingConsumer {
    fn on_chat_message(&self, message: &ChatMessage) {
        info!(
            from_user_id = message.from_user_id,
            from_user_name = %message.from_user_name,
            "Message from {} ({}): {}",
            message.from_user_name,
            message.from_user_id,
            message.message
        );
    }

    fn on_room_info(&self, info: &RoomInfo) {
        info!(room_id = info.room_id, count = info.count, "Room update");
        info!("Users in room: {}", info.user_names().join(", "));
    }
}

/// Payload forwarded to a [`ChannelConsumer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    Message(ChatMessage),
    RoomInfo(RoomInfo),
}

/// Consumer that forwards payloads over a bounded channel.
///
/// When the receiver falls behind, events are dropped with a warning rather
/// than stalling the listener.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<ChatEvent>,
}

impl ChannelConsumer {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn emit(&self, event: ChatEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("chat event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("chat event channel closed, receiver dropped");
            }
        }
    }
}

impl MessageConsumer for ChannelConsumer {
    fn on_chat_message(&self, message: &ChatMessage) {
        self.emit(ChatEvent::Message(message.clone()));
    }

    fn on_room_info(&self, info: &RoomInfo) {
        self.emit(ChatEvent::RoomInfo(info.clone()));
    }
}

/// Applies application messages to the session.
pub struct MessageDispatcher {
    consumer: DynConsumer,
}

impl MessageDispatcher {
    pub fn new(consumer: DynConsumer) -> Self {
        Self { consumer }
    }

    pub fn dispatch(&self, message: ServerMessage, state: &ClientState) {
        match message {
            ServerMessage::Success => {
                if state.mark_connected() {
                    info!("Successfully connected to room");
                } else {
                    debug!(phase = ?state.phase(), "ignoring success outside pending phase");
                }
            }
            ServerMessage::Fail => {
                state.stop();
                error!("Connection failed: handshake rejected by server");
            }
            ServerMessage::PushMsg(chat) => {
                state.record_chat_message();
                self.consumer.on_chat_message(&chat);
            }
            ServerMessage::RoomInfo(info) => {
                state.record_room_update();
                self.consumer.on_room_info(&info);
            }
            ServerMessage::Unknown(msg_type) => {
                state.record_unknown();
                warn!(msg_type = %msg_type, "Unknown message type");
            }
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LoggingConsumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionPhase;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(i64, String, String)>>,
        rooms: Mutex<Vec<RoomInfo>>,
    }

    impl MessageConsumer for Recorder {
        fn on_chat_message(&self, message: &ChatMessage) {
            self.messages.lock().push((
                message.from_user_id,
                message.from_user_name.clone(),
                message.message.clone(),
            ));
        }

        fn on_room_info(&self, info: &RoomInfo) {
            self.rooms.lock().push(info.clone());
        }
    }

    fn pending_state() -> ClientState {
        let state = ClientState::new();
        state.begin();
        state
    }

    #[test]
    fn test_success_connects() {
        let state = pending_state();
        MessageDispatcher::default().dispatch(ServerMessage::Success, &state);
        assert!(state.is_connected());
    }

    #[test]
    fn test_fail_ends_session() {
        let state = pending_state();
        let dispatcher = MessageDispatcher::default();
        dispatcher.dispatch(ServerMessage::Success, &state);
        dispatcher.dispatch(ServerMessage::Fail, &state);

        assert!(!state.is_connected());
        assert!(!state.is_running());

        dispatcher.dispatch(ServerMessage::Success, &state);
        assert_eq!(state.phase(), SessionPhase::Terminated);
    }

    #[test]
    fn test_pushmsg_reaches_consumer() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = MessageDispatcher::new(recorder.clone());
        let state = pending_state();

        dispatcher.dispatch(
            ServerMessage::PushMsg(ChatMessage {
                from_user_id: 1,
                from_user_name: "a".to_string(),
                message: "hi".to_string(),
                ..Default::default()
            }),
            &state,
        );

        assert_eq!(
            *recorder.messages.lock(),
            vec![(1, "a".to_string(), "hi".to_string())]
        );
        assert_eq!(state.metrics().chat_messages, 1);
    }

    #[test]
    fn test_roominfo_reaches_consumer() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = MessageDispatcher::new(recorder.clone());
        let state = pending_state();

        let mut info = RoomInfo {
            room_id: 456,
            count: 1,
            ..Default::default()
        };
        info.user_info.insert("123".to_string(), "alice".to_string());
        dispatcher.dispatch(ServerMessage::RoomInfo(info.clone()), &state);

        assert_eq!(*recorder.rooms.lock(), vec![info]);
        assert_eq!(state.metrics().room_updates, 1);
    }

    #[test]
    fn test_unknown_leaves_state_alone() {
        let state = pending_state();
        MessageDispatcher::default().dispatch(ServerMessage::Unknown("typing".into()), &state);

        assert_eq!(state.phase(), SessionPhase::Pending);
        assert_eq!(state.metrics().unknown_frames, 1);
    }

    #[tokio::test]
    async fn test_channel_consumer_forwards_and_drops_when_full() {
        let (consumer, mut rx) = ChannelConsumer::new(1);
        let info = RoomInfo::default();

        consumer.on_room_info(&info);
        consumer.on_chat_message(&ChatMessage::default());

        assert_eq!(rx.recv().await, Some(ChatEvent::RoomInfo(info)));
        assert!(rx.try_recv().is_err());
    }
}
