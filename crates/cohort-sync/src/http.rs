use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use cohort_types::api::{BulkReadRequest, MAX_BULK_READ_IDS, SendMessageRequest, UpdateReadRequest};
use cohort_types::{ConversationKey, DataAccess, Message, NewMessage, Notification, Partnership};

/// `DataAccess` over the CohortHub REST API.
///
/// Every call carries the user's bearer token. The server derives the user
/// from the token, so user arguments only guard against mixing up sessions.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: String,
    user_id: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            user_id: user_id.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn ensure_user(&self, user_id: &str) -> Result<()> {
        if user_id != self.user_id {
            bail!("store is authenticated as {}, not {}", self.user_id, user_id);
        }
        Ok(())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request
            .bearer_auth(&self.token)
            .send()
            .await
            .context("request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let url = resp.url().clone();
            let body = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", url.path(), status, body);
        }

        resp.json().await.context("malformed response body")
    }
}

#[async_trait]
impl DataAccess for HttpStore {
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let url = self.url(&format!("/conversations/{}/messages", key));
        self.send(self.client.get(url)).await
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        self.ensure_user(&message.sender_id)?;
        let url = self.url(&format!("/conversations/{}/messages", message.conversation_key));
        let body = SendMessageRequest {
            recipient_id: message.recipient_id,
            content: message.content,
        };
        let created: Message = self.send(self.client.post(url).json(&body)).await?;
        debug!("Created message {} in {}", created.id, created.conversation_key);
        Ok(created)
    }

    async fn fetch_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.ensure_user(user_id)?;
        self.send(self.client.get(self.url("/notifications"))).await
    }

    async fn update_notification_read_flag(&self, id: Uuid, read: bool) -> Result<Notification> {
        let url = self.url(&format!("/notifications/{}", id));
        self.send(self.client.patch(url).json(&UpdateReadRequest { read }))
            .await
    }

    async fn bulk_update_notification_read_flags(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<Vec<Notification>> {
        self.ensure_user(user_id)?;

        // The server caps each request; a failed batch only leaves its own
        // ids unconfirmed.
        let mut updated = Vec::with_capacity(ids.len());
        let mut first_error = None;
        let mut failed_batches = 0;
        let batches = ids.chunks(MAX_BULK_READ_IDS);
        let total = batches.len();
        for batch in batches {
            let body = BulkReadRequest {
                ids: batch.to_vec(),
                read,
            };
            let request = self.client.post(self.url("/notifications/read")).json(&body);
            match self.send::<Vec<Notification>>(request).await {
                Ok(rows) => updated.extend(rows),
                Err(e) => {
                    warn!("Bulk read batch of {} ids failed: {:#}", batch.len(), e);
                    failed_batches += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if failed_batches == total => Err(e),
            _ => Ok(updated),
        }
    }

    async fn fetch_partnership(&self, student_id: &str) -> Result<Option<Partnership>> {
        self.ensure_user(student_id)?;
        self.send(self.client.get(self.url("/partnership"))).await
    }
}
