//! Wire protocol for the chat connect layer.
//!
//! Every frame is a JSON object. Control-plane frames carry a `type`
//! discriminator (`ping` inbound, `pong` outbound); application frames carry
//! `msg_type`.
//!
//! ```text
//! client -> {"user_id":123,"room_id":456,"token":"t","msg_type":"connect"}
//! server -> {"msg_type":"success"}
//! server -> {"type":"ping"}
//! client -> {"type":"pong"}
//! server -> {"msg_type":"pushmsg","data":{"from_user_id":1,"from_user_name":"a","message":"hi"}}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `msg_type` values.
pub mod msg_types {
    pub const CONNECT: &str = "connect";
    pub const SUCCESS: &str = "success";
    pub const FAIL: &str = "fail";
    pub const PUSH_MSG: &str = "pushmsg";
    pub const ROOM_INFO: &str = "roominfo";
}

/// Keep-alive and ping reply frame.
pub const PONG_FRAME: &str = r#"{"type":"pong"}"#;

/// Identity presented in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: i64,
    pub room_id: i64,
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: i64, room_id: i64, token: impl Into<String>) -> Self {
        Self {
            user_id,
            room_id,
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct HandshakeFrame<'a> {
    user_id: i64,
    room_id: i64,
    token: &'a str,
    msg_type: &'static str,
}

/// Encode the handshake frame for `credentials`.
pub fn handshake_frame(credentials: &Credentials) -> serde_json::Result<String> {
    serde_json::to_string(&HandshakeFrame {
        user_id: credentials.user_id,
        room_id: credentials.room_id,
        token: &credentials.token,
        msg_type: msg_types::CONNECT,
    })
}

/// Payload of a `pushmsg` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    pub from_user_id: i64,
    pub from_user_name: String,
    pub message: String,
    pub to_user_id: i64,
    pub to_user_name: String,
    pub room_id: i64,
    pub create_time: String,
    pub message_id: i64,
}

/// Payload of a `roominfo` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomInfo {
    pub room_id: i64,
    pub count: i64,
    /// User id (as sent, a string key) to user name.
    pub user_info: BTreeMap<String, String>,
}

impl RoomInfo {
    /// Names of the users currently in the room.
    pub fn user_names(&self) -> Vec<&str> {
        self.user_info.values().map(String::as_str).collect()
    }
}

/// Application-plane message, keyed by `msg_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Success,
    Fail,
    PushMsg(ChatMessage),
    RoomInfo(RoomInfo),
    /// Any discriminator the client does not handle.
    Unknown(String),
}

impl ServerMessage {
    pub fn msg_type(&self) -> &str {
        match self {
            ServerMessage::Success => msg_types::SUCCESS,
            ServerMessage::Fail => msg_types::FAIL,
            ServerMessage::PushMsg(_) => msg_types::PUSH_MSG,
            ServerMessage::RoomInfo(_) => msg_types::ROOM_INFO,
            ServerMessage::Unknown(kind) => kind,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// `{"type":"ping"}`; answered with [`PONG_FRAME`], never dispatched.
    Ping,
    Message(ServerMessage),
}

/// Reasons an inbound payload cannot be turned into a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no msg_type")]
    MissingDiscriminator,

    #[error("invalid {msg_type} payload: {source}")]
    InvalidPayload {
        msg_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
    let Value::Object(mut object) = value else {
        return Err(FrameError::NotAnObject);
    };

    if object.get("type").and_then(Value::as_str) == Some("ping") {
        return Ok(InboundFrame::Ping);
    }

    let msg_type = match object.get("msg_type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => return Ok(InboundFrame::Message(ServerMessage::Unknown(other.to_string()))),
        None => return Err(FrameError::MissingDiscriminator),
    };
    let data = object.remove("data");

    let message = match msg_type.as_str() {
        msg_types::SUCCESS => ServerMessage::Success,
        msg_types::FAIL => ServerMessage::Fail,
        msg_types::PUSH_MSG => ServerMessage::PushMsg(payload(data, msg_types::PUSH_MSG)?),
        msg_types::ROOM_INFO => ServerMessage::RoomInfo(payload(data, msg_types::ROOM_INFO)?),
        _ => ServerMessage::Unknown(msg_type),
    };
    Ok(InboundFrame::Message(message))
}

fn payload<T>(data: Option<Value>, msg_type: &'static str) -> Result<T, FrameError>
where
    T: DeserializeOwned + Default,
{
    match data {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|source| FrameError::InvalidPayload { msg_type, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_frame() {
        let credentials = Credentials::new(123, 456, "t");
        let frame: Value = serde_json::from_str(&handshake_frame(&credentials).unwrap()).unwrap();
        assert_eq!(
            frame,
            serde_json::json!({"user_id": 123, "room_id": 456, "token": "t", "msg_type": "connect"})
        );
    }

    #[test]
    fn test_pong_frame_shape() {
        let frame: Value = serde_json::from_str(PONG_FRAME).unwrap();
        assert_eq!(frame, serde_json::json!({"type": "pong"}));
    }

    #[test]
    fn test_decode_ping() {
        assert_eq!(decode(r#"{"type":"ping"}"#).unwrap(), InboundFrame::Ping);
    }

    #[test]
    fn test_ping_wins_over_msg_type() {
        let frame = decode(r#"{"type":"ping","msg_type":"fail"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Ping);
    }

    #[test]
    fn test_non_ping_type_falls_through_to_msg_type() {
        let frame = decode(r#"{"type":"pong","msg_type":"success"}"#).unwrap();
        assert_eq!(frame, InboundFrame::Message(ServerMessage::Success));

        let err = decode(r#"{"type":"pong"}"#).unwrap_err();
        assert!(matches!(err, FrameError::MissingDiscriminator));
    }

    #[test]
    fn test_decode_pushmsg() {
        let frame = decode(
            r#"{"msg_type":"pushmsg","data":{"from_user_id":1,"from_user_name":"a","message":"hi"}}"#,
        )
        .unwrap();

        let InboundFrame::Message(ServerMessage::PushMsg(msg)) = frame else {
            panic!("expected pushmsg, got {:?}", frame);
        };
        assert_eq!(msg.from_user_id, 1);
        assert_eq!(msg.from_user_name, "a");
        assert_eq!(msg.message, "hi");
        assert_eq!(msg.message_id, 0);
    }

    #[test]
    fn test_decode_roominfo() {
        let frame = decode(
            r#"{"msg_type":"roominfo","data":{"room_id":456,"count":2,"user_info":{"1":"alice","2":"bob"}}}"#,
        )
        .unwrap();

        let InboundFrame::Message(ServerMessage::RoomInfo(info)) = frame else {
            panic!("expected roominfo, got {:?}", frame);
        };
        assert_eq!(info.room_id, 456);
        assert_eq!(info.count, 2);
        assert_eq!(info.user_names(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_missing_data_defaults() {
        let frame = decode(r#"{"msg_type":"roominfo"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Message(ServerMessage::RoomInfo(RoomInfo::default()))
        );
    }

    #[test]
    fn test_wrong_data_shape() {
        let err = decode(r#"{"msg_type":"pushmsg","data":"hello"}"#).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidPayload {
                msg_type: msg_types::PUSH_MSG,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_and_non_string_discriminators() {
        assert_eq!(
            decode(r#"{"msg_type":"typing"}"#).unwrap(),
            InboundFrame::Message(ServerMessage::Unknown("typing".to_string()))
        );
        assert_eq!(
            decode(r#"{"msg_type":7}"#).unwrap(),
            InboundFrame::Message(ServerMessage::Unknown("7".to_string()))
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(decode("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(decode("[1,2]"), Err(FrameError::NotAnObject)));
        assert!(matches!(decode("{}"), Err(FrameError::MissingDiscriminator)));
    }
}
