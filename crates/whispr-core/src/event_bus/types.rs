use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-originated event tags carried in the `t` field of gateway frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Handshake greeting
    Hello,
    /// Synthetic close notice sent before a transport close
    Close,
    /// A message was posted
    MessageCreate,
    /// A message was edited
    MessageUpdate,
    /// A message was deleted
    MessageDelete,
    /// A channel was created
    ChannelCreate,
    /// A channel was changed
    ChannelUpdate,
    /// A channel was deleted
    ChannelDelete,
}

impl ServerEvent {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerEvent::Hello => "HELLO",
            ServerEvent::Close => "CLOSE",
            ServerEvent::MessageCreate => "MESSAGE_CREATE",
            ServerEvent::MessageUpdate => "MESSAGE_UPDATE",
            ServerEvent::MessageDelete => "MESSAGE_DELETE",
            ServerEvent::ChannelCreate => "CHANNEL_CREATE",
            ServerEvent::ChannelUpdate => "CHANNEL_UPDATE",
            ServerEvent::ChannelDelete => "CHANNEL_DELETE",
        }
    }
}

impl std::fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event payload and the users it is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Users whose sessions should receive the event
    pub target_ids: Vec<String>,
    /// Event payload, forwarded verbatim
    pub data: Value,
}

impl Notification {
    /// Create a notification
    pub fn new(target_ids: Vec<String>, data: Value) -> Self {
        Self { target_ids, data }
    }

    /// Whether the notification is addressed to a user
    pub fn targets(&self, user_id: &str) -> bool {
        self.target_ids.iter().any(|id| id == user_id)
    }
}
