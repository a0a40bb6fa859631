/// Database row types — these map directly to SQLite rows.
/// Distinct from cohort-types models to keep the DB layer independent.
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use cohort_types::{
    Attachment, ConversationKey, Message, MessageContent, Notification, NotificationKind,
    Partnership,
};

pub const MESSAGE_COLUMNS: &str = "id, conversation_key, sender_id, recipient_id, kind, body, \
     file_name, file_size, content_type, file_url, created_at";

pub const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, read, created_at";

pub const PARTNERSHIP_COLUMNS: &str = "id, student_a, student_b, track, created_at";

/// Fixed-width RFC 3339 so that text ordering equals time ordering.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

pub struct MessageRow {
    pub id: String,
    pub conversation_key: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub kind: String,
    pub body: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub content_type: Option<String>,
    pub file_url: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_key: row.get(1)?,
            sender_id: row.get(2)?,
            recipient_id: row.get(3)?,
            kind: row.get(4)?,
            body: row.get(5)?,
            file_name: row.get(6)?,
            file_size: row.get(7)?,
            content_type: row.get(8)?,
            file_url: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn attachment(&self) -> Result<Attachment> {
        match (&self.file_name, self.file_size, &self.content_type, &self.file_url) {
            (Some(file_name), Some(size), Some(content_type), Some(url)) => Ok(Attachment {
                file_name: file_name.clone(),
                size: u64::try_from(size).unwrap_or_default(),
                content_type: content_type.clone(),
                url: url.clone(),
            }),
            _ => Err(anyhow!("message {} is missing attachment columns", self.id)),
        }
    }

    pub fn into_message(self) -> Result<Message> {
        let content = match self.kind.as_str() {
            "text" => MessageContent::Text {
                body: self.body.clone().unwrap_or_default(),
            },
            "file" => MessageContent::File {
                attachment: self.attachment()?,
            },
            "image" => MessageContent::Image {
                attachment: self.attachment()?,
            },
            other => return Err(anyhow!("message {} has unknown kind '{}'", self.id, other)),
        };

        Ok(Message {
            id: self
                .id
                .parse()
                .with_context(|| format!("corrupt message id '{}'", self.id))?,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            conversation_key: ConversationKey::parse(&self.conversation_key)
                .with_context(|| format!("corrupt conversation key '{}'", self.conversation_key))?,
            content,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            read: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: self
                .id
                .parse()
                .with_context(|| format!("corrupt notification id '{}'", self.id))?,
            user_id: self.user_id,
            kind: NotificationKind::from_db(&self.kind),
            title: self.title,
            body: self.body,
            read: self.read,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct PartnershipRow {
    pub id: String,
    pub student_a: String,
    pub student_b: String,
    pub track: String,
    pub created_at: String,
}

impl PartnershipRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            student_a: row.get(1)?,
            student_b: row.get(2)?,
            track: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn into_partnership(self) -> Result<Partnership> {
        Ok(Partnership {
            id: self
                .id
                .parse()
                .with_context(|| format!("corrupt partnership id '{}'", self.id))?,
            student_a: self.student_a,
            student_b: self.student_b,
            track: self.track,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
