use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use cohort_types::{
    ConversationKey, Message, NewMessage, NewNotification, NewPartnership,
    Notification, Partnership,
};

use crate::Database;
use crate::models::{
    MESSAGE_COLUMNS, MessageRow, NOTIFICATION_COLUMNS, NotificationRow, PARTNERSHIP_COLUMNS,
    PartnershipRow, format_timestamp, parse_timestamp,
};

impl Database {
    // -- Messages --

    /// Insert a message. The stored timestamp is strictly greater than every
    /// earlier timestamp of the same conversation.
    pub fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let last: Option<String> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_key = ?1",
                [message.conversation_key.as_str()],
                |row| row.get(0),
            )?;

            let mut created_at = Utc::now();
            if let Some(last) = last {
                let floor = parse_timestamp(&last)? + Duration::microseconds(1);
                if created_at < floor {
                    created_at = floor;
                }
            }

            let id = Uuid::new_v4();
            let kind = message.content.kind();
            let attachment = message.content.attachment();
            tx.execute(
                "INSERT INTO messages (id, conversation_key, sender_id, recipient_id, kind, body,
                     file_name, file_size, content_type, file_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id.to_string(),
                    message.conversation_key.as_str(),
                    message.sender_id,
                    message.recipient_id,
                    kind.as_str(),
                    message.content.body(),
                    attachment.map(|a| a.file_name.as_str()),
                    attachment.map(|a| i64::try_from(a.size).unwrap_or(i64::MAX)),
                    attachment.map(|a| a.content_type.as_str()),
                    attachment.map(|a| a.url.as_str()),
                    format_timestamp(created_at),
                ],
            )?;
            tx.commit()?;

            // Re-read so the returned row carries the stored (truncated) timestamp.
            query_message(conn, &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", id))
        })
    }

    pub fn get_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_messages(conn, key))
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, body, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    id.to_string(),
                    notification.user_id,
                    notification.kind.as_str(),
                    notification.title,
                    notification.body,
                    format_timestamp(Utc::now()),
                ],
            )?;
            query_notification(conn, &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("notification {} vanished after insert", id))
        })
    }

    pub fn get_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], NotificationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(NotificationRow::into_notification).collect()
        })
    }

    pub fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| query_notification(conn, &id.to_string()))
    }

    /// Set the read flag of one notification. Returns `None` if it does not exist.
    /// The flag only ever moves from unread to read.
    pub fn set_notification_read(&self, id: Uuid, read: bool) -> Result<Option<Notification>> {
        if !read {
            bail!("read flag of notification {} cannot be cleared", id);
        }
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1",
                [id.to_string()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_notification(conn, &id.to_string())
        })
    }

    /// Mark several of `user_id`'s notifications read in one transaction.
    /// Ids that do not exist or belong to someone else are skipped and absent
    /// from the result.
    pub fn set_notifications_read(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<Vec<Notification>> {
        if !read {
            bail!("read flags cannot be cleared");
        }
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut updated = Vec::with_capacity(ids.len());
            for id in ids {
                let changed = tx.execute(
                    "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                    params![id.to_string(), user_id],
                )?;
                if changed > 0 {
                    updated.push(id.to_string());
                }
            }
            tx.commit()?;

            let mut rows = Vec::with_capacity(updated.len());
            for id in &updated {
                if let Some(n) = query_notification(conn, id)? {
                    rows.push(n);
                }
            }
            Ok(rows)
        })
    }

    // -- Partnerships --

    pub fn insert_partnership(&self, partnership: &NewPartnership) -> Result<Partnership> {
        let id = Uuid::new_v4();
        // Store the pair sorted so UNIQUE(student_a, student_b) covers both orders.
        let (a, b) = if partnership.student_a <= partnership.student_b {
            (&partnership.student_a, &partnership.student_b)
        } else {
            (&partnership.student_b, &partnership.student_a)
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO partnerships (id, student_a, student_b, track, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), a, b, partnership.track, format_timestamp(Utc::now())],
            )?;
            Ok(())
        })?;

        self.with_conn(|conn| {
            let sql = format!("SELECT {PARTNERSHIP_COLUMNS} FROM partnerships WHERE id = ?1");
            let row = conn.query_row(&sql, [id.to_string()], PartnershipRow::from_row)?;
            row.into_partnership()
        })
    }

    /// The most recent partnership the student belongs to.
    pub fn get_partnership_for(&self, student_id: &str) -> Result<Option<Partnership>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {PARTNERSHIP_COLUMNS} FROM partnerships
                 WHERE student_a = ?1 OR student_b = ?1
                 ORDER BY created_at DESC
                 LIMIT 1"
            );
            conn.query_row(&sql, [student_id], PartnershipRow::from_row)
                .optional()?
                .map(PartnershipRow::into_partnership)
                .transpose()
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    conn.query_row(&sql, [id], MessageRow::from_row)
        .optional()?
        .map(MessageRow::into_message)
        .transpose()
}

fn query_messages(conn: &Connection, key: &ConversationKey) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE conversation_key = ?1
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([key.as_str()], MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(MessageRow::into_message).collect()
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<Notification>> {
    let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
    conn.query_row(&sql, [id], NotificationRow::from_row)
        .optional()?
        .map(NotificationRow::into_notification)
        .transpose()
}

#[cfg(test)]
mod tests {
    use cohort_types::{Attachment, MessageContent, NotificationKind};

    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn text(body: &str) -> MessageContent {
        MessageContent::Text { body: body.into() }
    }

    fn new_message(from: &str, to: &str, body: &str) -> NewMessage {
        NewMessage {
            sender_id: from.into(),
            recipient_id: to.into(),
            conversation_key: ConversationKey::between(from, to).unwrap(),
            content: text(body),
        }
    }

    fn new_notification(user: &str, title: &str) -> NewNotification {
        NewNotification {
            user_id: user.into(),
            kind: NotificationKind::SubmissionFeedback,
            title: title.into(),
            body: "Your week 2 task was reviewed".into(),
        }
    }

    #[test]
    fn messages_come_back_in_conversation_order() {
        let db = db();
        let first = db.insert_message(&new_message("alice", "bob", "one")).unwrap();
        let second = db.insert_message(&new_message("bob", "alice", "two")).unwrap();
        let third = db.insert_message(&new_message("alice", "bob", "three")).unwrap();
        db.insert_message(&new_message("alice", "carol", "elsewhere")).unwrap();

        assert!(first.created_at < second.created_at);
        assert!(second.created_at < third.created_at);

        let key = ConversationKey::between("bob", "alice").unwrap();
        let bodies: Vec<_> = db
            .get_messages(&key)
            .unwrap()
            .into_iter()
            .map(|m| m.content.body().unwrap_or_default().to_string())
            .collect();
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[test]
    fn attachment_columns_roundtrip() {
        let db = db();
        let mut message = new_message("alice", "bob", "");
        message.content = MessageContent::File {
            attachment: Attachment {
                file_name: "notes.pdf".into(),
                size: 1234,
                content_type: "application/pdf".into(),
                url: "https://files.example/notes.pdf".into(),
            },
        };
        let stored = db.insert_message(&message).unwrap();
        assert_eq!(stored.content, message.content);
    }

    #[test]
    fn notifications_newest_first() {
        let db = db();
        let old = db.insert_notification(&new_notification("alice", "old")).unwrap();
        let new = db.insert_notification(&new_notification("alice", "new")).unwrap();
        db.insert_notification(&new_notification("bob", "not mine")).unwrap();

        let list = db.get_notifications("alice").unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].created_at >= list[1].created_at);
        assert!(list.iter().any(|n| n.id == old.id));
        assert!(list.iter().any(|n| n.id == new.id));
        assert!(list.iter().all(|n| !n.read));
    }

    #[test]
    fn read_flag_never_clears() {
        let db = db();
        let n = db.insert_notification(&new_notification("alice", "hi")).unwrap();

        let updated = db.set_notification_read(n.id, true).unwrap().unwrap();
        assert!(updated.read);
        assert!(db.set_notification_read(n.id, false).is_err());
        assert!(db.get_notification(n.id).unwrap().unwrap().read);
        assert!(db.set_notification_read(Uuid::new_v4(), true).unwrap().is_none());
    }

    #[test]
    fn bulk_read_is_scoped_to_owner() {
        let db = db();
        let a1 = db.insert_notification(&new_notification("alice", "1")).unwrap();
        let a2 = db.insert_notification(&new_notification("alice", "2")).unwrap();
        let b1 = db.insert_notification(&new_notification("bob", "3")).unwrap();

        let updated = db
            .set_notifications_read("alice", &[a1.id, a2.id, b1.id, Uuid::new_v4()], true)
            .unwrap();
        let mut ids: Vec<_> = updated.iter().map(|n| n.id).collect();
        ids.sort();
        let mut expected = vec![a1.id, a2.id];
        expected.sort();
        assert_eq!(ids, expected);
        assert!(!db.get_notification(b1.id).unwrap().unwrap().read);
    }

    #[test]
    fn partnership_lookup_from_either_side() {
        let db = db();
        let p = db
            .insert_partnership(&NewPartnership {
                student_a: "zed".into(),
                student_b: "amy".into(),
                track: "frontend".into(),
            })
            .unwrap();
        assert_eq!(p.student_a, "amy");

        let found = db.get_partnership_for("zed").unwrap().unwrap();
        assert_eq!(found.id, p.id);
        assert_eq!(found.partner_of("zed"), Some("amy"));
        assert!(db.get_partnership_for("nobody").unwrap().is_none());
    }
}
