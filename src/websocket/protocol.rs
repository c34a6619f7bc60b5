//! Gateway WebSocket wire protocol.
//!
//! Every frame on the socket is a JSON object `{op, t?, d?, ts}`. The server
//! only ever sends `t` and `d` on Dispatch, Notification and Hello frames.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use whispr_core::ServerEvent;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Server → Client: synthetic close notice
    Dispatch = 0,
    /// Client → Server: liveness ping
    Heartbeat = 1,
    /// Server → Client: heartbeat reply
    HeartbeatAck = 2,
    /// Server → Client: handshake greeting
    Hello = 4,
    /// Server → Client: server event
    Notification = 5,
}

impl OpCode {
    /// Numeric wire value
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Resolve a wire value. Non-integral numbers are never valid opcodes.
    pub fn from_wire(op: f64) -> Option<Self> {
        if op.fract() != 0.0 {
            return None;
        }
        match op as i64 {
            0 => Some(OpCode::Dispatch),
            1 => Some(OpCode::Heartbeat),
            2 => Some(OpCode::HeartbeatAck),
            4 => Some(OpCode::Hello),
            5 => Some(OpCode::Notification),
            _ => None,
        }
    }
}

/// Transport close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCloseCode {
    UnknownError = 4000,
    UnknownOpCode = 4001,
    NotAuthenticated = 4002,
    AuthenticationFailed = 4003,
    AlreadyAuthenticated = 4004,
    SessionTimeOut = 4005,
    UnknownConnection = 4006,
    InvalidPayload = 4007,
}

impl GatewayCloseCode {
    /// Numeric close code
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Server → Client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
    pub ts: i64,
}

impl GatewayMessage {
    fn new(op: OpCode, event: Option<ServerEvent>, data: Option<Value>) -> Self {
        Self {
            op: op.code(),
            t: event.map(|e| e.as_str().to_string()),
            d: data,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Handshake greeting carrying the heartbeat interval and connection id
    pub fn hello(heartbeat_interval_ms: u64, connection_id: Uuid) -> Self {
        Self::new(
            OpCode::Hello,
            Some(ServerEvent::Hello),
            Some(json!({
                "heartbeat_interval": heartbeat_interval_ms,
                "uuid": connection_id,
            })),
        )
    }

    /// Reply to a client heartbeat
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, None, None)
    }

    /// Server event forwarded from the notification bus
    pub fn notification(event: ServerEvent, data: Value) -> Self {
        Self::new(OpCode::Notification, Some(event), Some(data))
    }

    /// Notice sent just before the transport close
    pub fn close_notice(code: GatewayCloseCode, reason: &str) -> Self {
        Self::new(
            OpCode::Dispatch,
            Some(ServerEvent::Close),
            Some(json!({ "code": code.code(), "reason": reason })),
        )
    }

    /// Serialized frame
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client → Server frame as accepted on the wire.
///
/// Any JSON number is accepted for `op`, `t` and `ts`; opcode resolution
/// happens after the shape check.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    op: f64,
    #[serde(default)]
    #[allow(dead_code)]
    t: Option<serde_json::Number>,
    #[serde(default)]
    #[allow(dead_code)]
    d: Option<Value>,
    #[allow(dead_code)]
    ts: f64,
}

/// Why an inbound frame was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundError {
    /// Not JSON or missing required fields
    InvalidPayload,
    /// Well-formed, but the opcode is not part of the protocol
    UnknownOpCode,
}

impl InboundError {
    /// Close code and reason used to reject the frame
    pub fn close(self) -> (GatewayCloseCode, &'static str) {
        match self {
            InboundError::InvalidPayload => (GatewayCloseCode::InvalidPayload, "Invalid payload"),
            InboundError::UnknownOpCode => (GatewayCloseCode::UnknownOpCode, "Unknown opcode"),
        }
    }
}

/// Validate an inbound frame and resolve its opcode.
pub fn parse_inbound(bytes: &[u8]) -> Result<OpCode, InboundError> {
    let frame: InboundFrame =
        serde_json::from_slice(bytes).map_err(|_| InboundError::InvalidPayload)?;
    OpCode::from_wire(frame.op).ok_or(InboundError::UnknownOpCode)
}
