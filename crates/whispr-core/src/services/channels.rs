//! Channels and the messages posted in them
//!
//! Every mutation publishes a server event naming the users whose gateway
//! sessions should hear about it.

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::users::USER_NOT_FOUND;
use super::{new_id, parse_id};
use crate::error::{Error, Result};
use crate::event_bus::{Notification, NotificationBus, ServerEvent};
use crate::models::{
    Channel, ChannelPermissions, Message, MessageContent, MessageView, UserSummary,
};
use crate::store::Store;

/// Messages returned per page, newest first
pub const MESSAGES_PER_PAGE: i64 = 50;

const NO_ACCESS: &str = "User does not have access";
const INVALID_CHANNEL: &str = "Invalid channel id";
const MESSAGE_NOT_FOUND: &str = "Message not found";
const TARGET_NOT_MEMBER: &str = "Message target is not a channel member";

/// Channel and message service
#[derive(Debug, Clone)]
pub struct ChannelService {
    store: Store,
    bus: NotificationBus,
}

impl ChannelService {
    /// Create the service
    pub fn new(store: Store, bus: NotificationBus) -> Self {
        Self { store, bus }
    }

    /// Channels the user belongs to
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Channel>> {
        self.store.channels_for_user(user_id).await
    }

    /// A channel the user belongs to
    pub async fn get(&self, channel_id: &str, user_id: &str) -> Result<Channel> {
        let channel_id = parse_id(channel_id, INVALID_CHANNEL)?;
        let channel = self
            .store
            .find_channel(&channel_id)
            .await?
            .ok_or_else(|| Error::validation("Channel not found"))?;

        if !channel.members.iter().any(|m| m.id == user_id) {
            return Err(Error::unauthorized(NO_ACCESS));
        }
        Ok(channel)
    }

    /// A user's permissions on a channel; no membership means no access
    pub async fn permissions(&self, channel_id: &str, user_id: &str) -> Result<ChannelPermissions> {
        let channel_id = parse_id(channel_id, INVALID_CHANNEL)?;
        Ok(self
            .store
            .find_channel_permissions(&channel_id, user_id)
            .await?
            .unwrap_or(ChannelPermissions::NONE))
    }

    /// Create a channel between the owner and the recipients
    pub async fn create(
        &self,
        owner_id: &str,
        recipients: &[String],
        name: Option<&str>,
    ) -> Result<Channel> {
        if recipients.iter().any(|r| r == owner_id) {
            return Err(Error::validation("Cannot include self as recipient"));
        }

        let recipients: BTreeSet<String> = recipients.iter().cloned().collect();
        if recipients.is_empty() {
            return Err(Error::validation("At least one recipient is required"));
        }

        let requested: Vec<String> = recipients.iter().cloned().collect();
        if self.store.existing_user_ids(&requested).await?.len() != recipients.len() {
            return Err(Error::validation(USER_NOT_FOUND));
        }

        let mut wanted = recipients.clone();
        wanted.insert(owner_id.to_string());
        for channel in self.store.channels_for_user(owner_id).await? {
            let members: BTreeSet<String> = channel.members.iter().map(|m| m.id.clone()).collect();
            if members == wanted {
                return Err(Error::validation("Channel already exists"));
            }
        }

        let channel_id = new_id();
        let members: Vec<(String, ChannelPermissions)> = wanted
            .iter()
            .map(|id| (id.clone(), ChannelPermissions::OWNER))
            .collect();
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        self.store
            .create_channel(&channel_id, name, Utc::now(), &members)
            .await?;

        let channel = self
            .store
            .find_channel(&channel_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("channel {} vanished after insert", channel_id)))?;

        self.bus.publish(
            ServerEvent::ChannelCreate,
            Notification::new(
                wanted.into_iter().collect(),
                json!({ "channel": serde_json::to_value(&channel)? }),
            ),
        );

        info!(channel_id = %channel.id, owner = %owner_id, members = channel.members.len(), "Channel created");
        Ok(channel)
    }

    /// One page (1-based) of a channel's messages as seen by the reader
    pub async fn messages(
        &self,
        channel_id: &str,
        user_id: &str,
        page: i64,
    ) -> Result<Vec<MessageView>> {
        let channel_id = self.require(channel_id, user_id, Access::Read).await?;
        let offset = (page.max(1) - 1).saturating_mul(MESSAGES_PER_PAGE);

        let messages = self
            .store
            .list_messages(&channel_id, MESSAGES_PER_PAGE, offset)
            .await?;

        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            views.push(self.view(message, user_id).await?);
        }
        Ok(views)
    }

    /// A single message as seen by the reader
    pub async fn message(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<MessageView> {
        let channel_id = self.require(channel_id, user_id, Access::Read).await?;
        let message = self.find_in_channel(&channel_id, message_id).await?;
        self.view(message, user_id).await
    }

    /// Post a message. `content` holds one ciphertext per recipient.
    pub async fn post_message(
        &self,
        channel_id: &str,
        author_id: &str,
        content: &[MessageContent],
    ) -> Result<Message> {
        let channel_id = self.require(channel_id, author_id, Access::Write).await?;
        self.require_member_targets(&channel_id, content).await?;

        let message = Message {
            id: new_id(),
            channel_id: channel_id.clone(),
            user_id: author_id.to_string(),
            created_at: Utc::now(),
            edited_at: None,
        };
        self.store.create_message(&message, content).await?;

        self.publish_message(ServerEvent::MessageCreate, &message, content)
            .await?;

        debug!(message_id = %message.id, channel_id = %channel_id, "Message posted");
        Ok(message)
    }

    /// Replace the ciphertexts of a message. Only the author may edit.
    pub async fn update_message(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
        content: &[MessageContent],
    ) -> Result<Message> {
        let channel_id = self.require(channel_id, user_id, Access::Write).await?;
        let mut message = self.find_in_channel(&channel_id, message_id).await?;
        if message.user_id != user_id {
            return Err(Error::unauthorized("User does not have permission"));
        }
        self.require_member_targets(&channel_id, content).await?;

        let edited_at = Utc::now();
        if !self
            .store
            .replace_message_content(&message.id, content, edited_at)
            .await?
        {
            return Err(Error::validation(MESSAGE_NOT_FOUND));
        }
        message.edited_at = Some(edited_at);

        self.publish_message(ServerEvent::MessageUpdate, &message, content)
            .await?;
        Ok(message)
    }

    /// Delete a message. Only the author may delete.
    pub async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let channel_id = parse_id(channel_id, INVALID_CHANNEL)?;
        let message = self.find_in_channel(&channel_id, message_id).await?;
        if message.user_id != user_id {
            return Err(Error::unauthorized("User does not have permission"));
        }

        self.store.delete_message(&message.id).await?;

        let members = self.store.channel_member_ids(&channel_id).await?;
        self.bus.publish(
            ServerEvent::MessageDelete,
            Notification::new(
                members,
                json!({ "channelId": channel_id, "id": message.id }),
            ),
        );
        Ok(())
    }

    async fn require(&self, channel_id: &str, user_id: &str, access: Access) -> Result<String> {
        let channel_id = parse_id(channel_id, INVALID_CHANNEL)?;
        let permissions = self
            .store
            .find_channel_permissions(&channel_id, user_id)
            .await?
            .unwrap_or(ChannelPermissions::NONE);

        let allowed = match access {
            Access::Read => permissions.can_read,
            Access::Write => permissions.can_write,
        };
        if !allowed {
            return Err(Error::unauthorized(NO_ACCESS));
        }
        Ok(channel_id)
    }

    /// Ciphertexts may only be addressed to members; targets drive fan-out.
    async fn require_member_targets(
        &self,
        channel_id: &str,
        content: &[MessageContent],
    ) -> Result<()> {
        let members = self.store.channel_member_ids(channel_id).await?;
        if content.iter().any(|text| !members.contains(&text.target)) {
            return Err(Error::validation(TARGET_NOT_MEMBER));
        }
        Ok(())
    }

    async fn find_in_channel(&self, channel_id: &str, message_id: &str) -> Result<Message> {
        let message_id = parse_id(message_id, MESSAGE_NOT_FOUND)?;
        match self.store.find_message(&message_id).await? {
            Some(message) if message.channel_id == channel_id => Ok(message),
            _ => Err(Error::validation(MESSAGE_NOT_FOUND)),
        }
    }

    async fn author(&self, user_id: &str) -> Result<UserSummary> {
        self.store
            .find_user_summary(user_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("author {} not found", user_id)))
    }

    async fn view(&self, message: Message, reader_id: &str) -> Result<MessageView> {
        let content = self.store.find_message_text(&message.id, reader_id).await?;
        let author = self.author(&message.user_id).await?;
        Ok(MessageView {
            id: message.id,
            channel_id: message.channel_id,
            content,
            author,
            created_at: message.created_at,
            updated_at: message.edited_at,
        })
    }

    async fn publish_message(
        &self,
        event: ServerEvent,
        message: &Message,
        content: &[MessageContent],
    ) -> Result<()> {
        let mut targets = vec![message.user_id.clone()];
        for text in content {
            if !targets.contains(&text.target) {
                targets.push(text.target.clone());
            }
        }

        let texts = self.store.message_texts(&message.id).await?;
        let author = self.author(&message.user_id).await?;

        self.bus.publish(
            event,
            Notification::new(
                targets,
                json!({
                    "id": message.id,
                    "channelId": message.channel_id,
                    "content": serde_json::to_value(&texts)?,
                    "author": serde_json::to_value(&author)?,
                    "createdAt": message.created_at,
                    "updatedAt": message.edited_at,
                }),
            ),
        );
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}
