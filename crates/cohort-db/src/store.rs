use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::error;
use uuid::Uuid;

use cohort_types::{ConversationKey, DataAccess, Message, NewMessage, Notification, Partnership};

use crate::Database;

/// `DataAccess` over the local SQLite database.
///
/// Every query runs on the blocking pool so callers on the async runtime
/// never hold the connection mutex.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a closure against the database on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("database task failed: {}", e)
            })?
    }
}

#[async_trait]
impl DataAccess for SqliteStore {
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let key = key.clone();
        self.run(move |db| db.get_messages(&key)).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        self.run(move |db| db.insert_message(&message)).await
    }

    async fn fetch_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let user_id = user_id.to_string();
        self.run(move |db| db.get_notifications(&user_id)).await
    }

    async fn update_notification_read_flag(&self, id: Uuid, read: bool) -> Result<Notification> {
        self.run(move |db| db.set_notification_read(id, read))
            .await?
            .ok_or_else(|| anyhow!("notification {} not found", id))
    }

    async fn bulk_update_notification_read_flags(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<Vec<Notification>> {
        let user_id = user_id.to_string();
        let ids = ids.to_vec();
        self.run(move |db| db.set_notifications_read(&user_id, &ids, read))
            .await
    }

    async fn fetch_partnership(&self, student_id: &str) -> Result<Option<Partnership>> {
        let student_id = student_id.to_string();
        self.run(move |db| db.get_partnership_for(&student_id)).await
    }
}
