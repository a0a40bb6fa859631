use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ConversationKey, Message, NewMessage, Notification, Partnership};

/// Request/response contract of the data access layer.
///
/// Implemented by the SQLite store on the server and by the HTTP client on
/// the student side. All calls may suspend; none of them retry.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// All messages of a conversation, oldest first.
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>>;

    /// Persist a message and return the stored row.
    async fn create_message(&self, message: NewMessage) -> Result<Message>;

    /// All notifications of a user, most recent first.
    async fn fetch_notifications(&self, user_id: &str) -> Result<Vec<Notification>>;

    async fn update_notification_read_flag(&self, id: Uuid, read: bool) -> Result<Notification>;

    /// Returns only the rows that were actually updated.
    async fn bulk_update_notification_read_flags(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<Vec<Notification>>;

    async fn fetch_partnership(&self, student_id: &str) -> Result<Option<Partnership>>;
}
