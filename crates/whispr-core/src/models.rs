//! Domain entities shared by the store, the services and the REST layer
//!
//! Serialized field names are camelCase to match the client wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Regular account
    User,
    /// Administrator
    Admin,
}

impl Role {
    /// Column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A stored account
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// User id
    pub id: String,
    /// Unique login name
    pub username: String,
    /// Display name
    pub nickname: String,
    /// Server-hardened password (`hash:clientSalt:serverSalt`)
    pub password: String,
    /// Account role
    pub role: Role,
    /// Whether the account is banned
    pub banned: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A user's asymmetric key pair; the private half is encrypted client-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    /// Public key
    pub public_key: String,
    /// Client-encrypted private key
    pub encrypted_private_key: String,
}

/// Profile returned by user lookups
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// User id
    pub id: String,
    /// Login name
    pub username: String,
    /// Display name
    pub nickname: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Public key, if established
    pub public_key: Option<String>,
    /// Encrypted private key, only present for the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_private_key: Option<String>,
}

/// Minimal user reference embedded in channels and messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// User id
    pub id: String,
    /// Login name
    pub username: String,
    /// Display name
    pub nickname: String,
    /// Public key, if established
    pub public_key: Option<String>,
}

/// A conversation and its members
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel id
    pub id: String,
    /// Optional display name
    pub name: Option<String>,
    /// Most recent message id
    pub last_message_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Members with any permission on the channel
    pub members: Vec<UserSummary>,
}

/// A member's permissions on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPermissions {
    /// May read messages
    pub can_read: bool,
    /// May post messages
    pub can_write: bool,
}

impl ChannelPermissions {
    /// Read and write
    pub const OWNER: Self = Self {
        can_read: true,
        can_write: true,
    };

    /// No access
    pub const NONE: Self = Self {
        can_read: false,
        can_write: false,
    };
}

/// Ciphertext addressed to one recipient, as submitted by the author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    /// Recipient user id
    pub target: String,
    /// Opaque ciphertext
    pub cipher: String,
    /// Opaque wrapped symmetric key
    pub encrypted_symmetric_key: String,
}

/// Ciphertext as delivered to its recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageText {
    /// Recipient user id
    pub target_user_id: String,
    /// Opaque ciphertext
    pub cipher_text: String,
    /// Opaque wrapped symmetric key
    pub encrypted_symmetric_key: String,
}

/// A stored message header
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message id
    pub id: String,
    /// Owning channel
    pub channel_id: String,
    /// Author id
    pub user_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub edited_at: Option<DateTime<Utc>>,
}

/// A message as seen by one reader
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id
    pub id: String,
    /// Owning channel
    pub channel_id: String,
    /// The reader's ciphertext, if one was addressed to them
    pub content: Option<MessageText>,
    /// Author
    pub author: UserSummary,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub updated_at: Option<DateTime<Utc>>,
}
