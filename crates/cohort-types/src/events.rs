use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ConversationKey, Message, Notification, validate_user_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Messages,
    Notifications,
}

/// The changed row, tagged by the table it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum Record {
    Messages(Message),
    Notifications(Notification),
}

/// A row change pushed by the realtime layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub operation: ChangeOperation,
    pub record: Record,
}

impl RealtimeEvent {
    pub fn message_inserted(message: Message) -> Self {
        Self {
            operation: ChangeOperation::Insert,
            record: Record::Messages(message),
        }
    }

    pub fn notification_inserted(notification: Notification) -> Self {
        Self {
            operation: ChangeOperation::Insert,
            record: Record::Notifications(notification),
        }
    }

    pub fn notification_updated(notification: Notification) -> Self {
        Self {
            operation: ChangeOperation::Update,
            record: Record::Notifications(notification),
        }
    }

    pub fn table(&self) -> Table {
        match self.record {
            Record::Messages(_) => Table::Messages,
            Record::Notifications(_) => Table::Notifications,
        }
    }

    /// The message row, if this is a message insert.
    pub fn inserted_message(&self) -> Option<&Message> {
        match (&self.operation, &self.record) {
            (ChangeOperation::Insert, Record::Messages(m)) => Some(m),
            _ => None,
        }
    }

    /// The notification row, if this is a notification insert.
    pub fn inserted_notification(&self) -> Option<&Notification> {
        match (&self.operation, &self.record) {
            (ChangeOperation::Insert, Record::Notifications(n)) => Some(n),
            _ => None,
        }
    }
}

const MESSAGES_PREFIX: &str = "messages:";
const NOTIFICATIONS_PREFIX: &str = "notifications:";

/// Name of a realtime channel.
///
/// `messages:<conversation key>` carries one conversation,
/// `notifications:<user id>` carries one user's notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn conversation(key: &ConversationKey) -> Self {
        Self(format!("{MESSAGES_PREFIX}{key}"))
    }

    pub fn notifications(user_id: &str) -> Self {
        Self(format!("{NOTIFICATIONS_PREFIX}{user_id}"))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(key) = raw.strip_prefix(MESSAGES_PREFIX) {
            ConversationKey::parse(key).ok()?;
        } else if let Some(user_id) = raw.strip_prefix(NOTIFICATIONS_PREFIX) {
            validate_user_id(user_id).ok()?;
        } else {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    /// Whether `user_id` may listen on this channel: participants only for
    /// conversations, the owner only for notifications.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        if let Some(key) = self.0.strip_prefix(MESSAGES_PREFIX) {
            ConversationKey::parse(key).is_ok_and(|k| k.includes(user_id))
        } else if let Some(owner) = self.0.strip_prefix(NOTIFICATIONS_PREFIX) {
            owner == user_id
        } else {
            false
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commands sent FROM client TO server over the gateway WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving changes for these channels.
    Subscribe { channels: Vec<String> },

    /// Stop receiving changes for these channels.
    Unsubscribe { channels: Vec<String> },
}

/// Frames sent FROM server TO client over the gateway WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayFrame {
    /// Server confirms successful authentication
    Ready { user_id: String },

    /// Channels the server accepted from a Subscribe command
    Subscribed { channels: Vec<String> },

    /// A channel the user may not (or cannot) listen on
    Rejected { channel: String, reason: String },

    /// A row changed on a subscribed channel
    Change { channel: ChannelKey, event: RealtimeEvent },
}
