use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between the two participant ids of a conversation key.
pub const KEY_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier '{0}' contains a reserved ':'")]
    Reserved(String),
    #[error("a conversation needs two distinct participants")]
    SameParticipant,
    #[error("malformed conversation key '{0}'")]
    Malformed(String),
}

/// Validate a user identifier as used in conversation and channel keys.
pub fn validate_user_id(id: &str) -> Result<(), IdError> {
    if id.trim().is_empty() {
        return Err(IdError::Empty);
    }
    if id.contains(KEY_SEPARATOR) {
        return Err(IdError::Reserved(id.to_string()));
    }
    Ok(())
}

// -- Conversations --

/// Order-independent key of a two-party conversation: `"<lo>:<hi>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn between(a: &str, b: &str) -> Result<Self, IdError> {
        validate_user_id(a)?;
        validate_user_id(b)?;
        let (lo, hi) = match a.cmp(b) {
            Ordering::Less => (a, b),
            Ordering::Greater => (b, a),
            Ordering::Equal => return Err(IdError::SameParticipant),
        };
        Ok(Self(format!("{lo}{KEY_SEPARATOR}{hi}")))
    }

    /// Parse a key coming off the wire. Only canonical (sorted) keys are accepted.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let (a, b) = raw
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| IdError::Malformed(raw.to_string()))?;
        let key = Self::between(a, b)?;
        if key.0 != raw {
            return Err(IdError::Malformed(raw.to_string()));
        }
        Ok(key)
    }

    pub fn participants(&self) -> (&str, &str) {
        // Constructors guarantee exactly one separator.
        self.0.split_once(KEY_SEPARATOR).unwrap_or((&self.0, ""))
    }

    pub fn includes(&self, user_id: &str) -> bool {
        let (a, b) = self.participants();
        a == user_id || b == user_id
    }

    /// The participant that is not `user_id`, if `user_id` takes part at all.
    pub fn other(&self, user_id: &str) -> Option<&str> {
        match self.participants() {
            (a, b) if a == user_id => Some(b),
            (a, b) if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.0
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
    Image,
}

impl MessageKind {
    /// Kind an attachment renders as, judged by its content type.
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            Self::Image
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Image => "image",
        }
    }
}

/// Reference to an uploaded file in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { body: String },
    File { attachment: Attachment },
    Image { attachment: Attachment },
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::File { .. } => MessageKind::File,
            Self::Image { .. } => MessageKind::Image,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Text { body } => Some(body),
            Self::File { .. } | Self::Image { .. } => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Text { .. } => None,
            Self::File { attachment } | Self::Image { attachment } => Some(attachment),
        }
    }

    /// A text message with nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.body().is_some_and(|b| b.trim().is_empty())
    }
}

/// A persisted chat message. Never updated or deleted once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub conversation_key: ConversationKey,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Sort key of a conversation feed: oldest first, ties by id.
    pub fn order_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

/// Create-message mutation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub recipient_id: String,
    pub conversation_key: ConversationKey,
    pub content: MessageContent,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SubmissionFeedback,
    PartnerActivity,
    ClarityCall,
    Achievement,
    #[serde(other)]
    Generic,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionFeedback => "submission_feedback",
            Self::PartnerActivity => "partner_activity",
            Self::ClarityCall => "clarity_call",
            Self::Achievement => "achievement",
            Self::Generic => "generic",
        }
    }

    /// Lenient parse for stored values; anything unknown is `Generic`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "submission_feedback" => Self::SubmissionFeedback,
            "partner_activity" => Self::PartnerActivity,
            "clarity_call" => Self::ClarityCall,
            "achievement" => Self::Achievement,
            _ => Self::Generic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Server-side trigger payload (submission reviewed, partner active, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

// -- Partnerships --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partnership {
    pub id: Uuid,
    pub student_a: String,
    pub student_b: String,
    pub track: String,
    pub created_at: DateTime<Utc>,
}

impl Partnership {
    pub fn partner_of(&self, student_id: &str) -> Option<&str> {
        if self.student_a == student_id {
            Some(&self.student_b)
        } else if self.student_b == student_id {
            Some(&self.student_a)
        } else {
            None
        }
    }

    pub fn conversation_key(&self) -> Result<ConversationKey, IdError> {
        ConversationKey::between(&self.student_a, &self.student_b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPartnership {
    pub student_a: String,
    pub student_b: String,
    pub track: String,
}
