use std::time::Duration;

use tracing::{debug, info, warn};

use cohort_realtime::{EventFilter, RealtimeError, SubscriptionGuard};
use cohort_types::{
    Attachment, ChannelKey, ConversationKey, Message, MessageContent, MessageKind, NewMessage,
    RealtimeEvent, Table, validate_user_id,
};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::feed::MessageFeed;
use crate::inbox::{Inbound, Inbox};
use crate::refresh::PeriodicRefresh;

/// Compose box contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub body: String,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
}

impl Default for Draft {
    fn default() -> Self {
        Self {
            body: String::new(),
            kind: MessageKind::Text,
            attachment: None,
        }
    }
}

impl Draft {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Kind follows the attachment's content type.
    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            kind: MessageKind::for_content_type(&attachment.content_type),
            attachment: Some(attachment),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.attachment.is_none()
    }

    /// What `send` would transmit.
    ///
    /// An attachment is sent as a file or image message; with kind `Text`
    /// the content type decides which. Any body typed next to an attachment
    /// stays in the draft for the next send.
    pub fn content(&self) -> Result<MessageContent> {
        match (&self.attachment, self.kind) {
            (Some(attachment), kind) => {
                let kind = match kind {
                    MessageKind::Text => MessageKind::for_content_type(&attachment.content_type),
                    other => other,
                };
                let attachment = attachment.clone();
                Ok(match kind {
                    MessageKind::Image => MessageContent::Image { attachment },
                    _ => MessageContent::File { attachment },
                })
            }
            (None, _) if self.body.trim().is_empty() => Err(SyncError::EmptyMessage),
            (None, MessageKind::Text) => Ok(MessageContent::Text {
                body: self.body.clone(),
            }),
            (None, kind) => Err(SyncError::MissingAttachment(kind)),
        }
    }

    /// Drop whatever `content` put on the wire.
    fn consume(&mut self, sent: &MessageContent) {
        match sent {
            MessageContent::Text { .. } => self.body.clear(),
            MessageContent::File { .. } | MessageContent::Image { .. } => self.attachment = None,
        }
        self.kind = MessageKind::Text;
    }
}

/// Live message feed of one two-party conversation.
///
/// Owned by a single task. Realtime deliveries and refresh snapshots queue up
/// and are applied by `pump` or `recv`. Closing or dropping the session
/// releases the realtime subscription and stops the refresh timer.
pub struct ChatSession {
    ctx: SyncContext,
    self_id: String,
    partner_id: String,
    key: ConversationKey,
    feed: MessageFeed,
    inbox: Inbox<Message>,
    subscription: Option<SubscriptionGuard>,
    realtime_error: Option<RealtimeError>,
    refresh: Option<PeriodicRefresh>,
}

impl ChatSession {
    pub async fn open(ctx: SyncContext, self_id: &str, partner_id: &str) -> Result<Self> {
        let key =
            ConversationKey::between(self_id, partner_id).map_err(SyncError::InvalidParticipants)?;

        // Subscribe before the fetch so rows inserted in between are not
        // missed; overlap is removed by id.
        let inbox = Inbox::new();
        let (subscription, realtime_error) = ctx
            .subscribe(
                ChannelKey::conversation(&key),
                EventFilter::inserts(Table::Messages),
                inbox.realtime_callback(),
            )
            .await;

        let messages = ctx.store.fetch_messages(&key).await.map_err(|e| {
            warn!("Failed to load conversation {}: {:#}", key, e);
            SyncError::LoadFailed(e)
        })?;
        let feed = MessageFeed::from_messages(messages);
        info!("Opened conversation {} ({} messages)", key, feed.len());

        let mut session = Self {
            self_id: self_id.to_string(),
            partner_id: partner_id.to_string(),
            key,
            feed,
            inbox,
            subscription,
            realtime_error,
            refresh: None,
            ctx,
        };
        if session.ctx.config.periodic_refresh {
            session.enable_periodic_refresh(session.ctx.config.refresh_interval);
        }
        Ok(session)
    }

    /// Open the conversation with the student's accountability partner.
    pub async fn open_with_partner(ctx: SyncContext, self_id: &str) -> Result<Self> {
        validate_user_id(self_id).map_err(SyncError::InvalidParticipants)?;

        let partnership = ctx
            .store
            .fetch_partnership(self_id)
            .await
            .map_err(SyncError::LoadFailed)?
            .ok_or_else(|| SyncError::NoPartnership(self_id.to_string()))?;
        let partner_id = partnership
            .partner_of(self_id)
            .ok_or_else(|| SyncError::NoPartnership(self_id.to_string()))?
            .to_string();

        Self::open(ctx, self_id, &partner_id).await
    }

    /// Send the draft. The stored row joins the feed right away and the sent
    /// part of the draft is cleared; on failure nothing changes.
    pub async fn send(&mut self, draft: &mut Draft) -> Result<Message> {
        let content = draft.content()?;

        let message = self
            .ctx
            .store
            .create_message(NewMessage {
                sender_id: self.self_id.clone(),
                recipient_id: self.partner_id.clone(),
                conversation_key: self.key.clone(),
                content: content.clone(),
            })
            .await
            .map_err(|e| {
                warn!("Failed to send message in {}: {:#}", self.key, e);
                self.ctx.toasts.error("Message not sent");
                SyncError::SendFailed(e)
            })?;

        draft.consume(&content);
        debug!("Sent {} message {} in {}", message.content.kind().as_str(), message.id, self.key);
        self.feed.insert(message.clone());
        Ok(message)
    }

    /// Apply one realtime event. Returns true if the feed changed.
    pub fn apply_event(&mut self, event: RealtimeEvent) -> bool {
        match event.inserted_message() {
            Some(message) if message.conversation_key == self.key => {
                self.feed.insert(message.clone())
            }
            _ => false,
        }
    }

    /// Apply everything queued so far without waiting. Returns how many
    /// inputs changed the feed.
    pub fn pump(&mut self) -> usize {
        let mut changed = 0;
        while let Some(input) = self.inbox.try_next() {
            if self.apply(input) {
                changed += 1;
            }
        }
        changed
    }

    /// Wait for the next queued input and apply it.
    pub async fn recv(&mut self) -> bool {
        match self.inbox.next().await {
            Some(input) => self.apply(input),
            None => false,
        }
    }

    /// Manual full reload. A failed reload empties the feed rather than
    /// showing stale rows.
    pub async fn reload(&mut self) -> Result<usize> {
        match self.ctx.store.fetch_messages(&self.key).await {
            Ok(messages) => {
                self.feed = MessageFeed::from_messages(messages);
                Ok(self.feed.len())
            }
            Err(e) => {
                warn!("Reload of {} failed: {:#}", self.key, e);
                self.feed.clear();
                self.ctx.toasts.error("Could not load messages");
                Err(SyncError::LoadFailed(e))
            }
        }
    }

    /// Start, or restart with a new period, the refresh fallback.
    pub fn enable_periodic_refresh(&mut self, interval: Duration) {
        let store = self.ctx.store.clone();
        let key = self.key.clone();
        let tx = self.inbox.sender();

        self.refresh = Some(PeriodicRefresh::spawn(interval, true, move || {
            let store = store.clone();
            let key = key.clone();
            let tx = tx.clone();
            async move {
                let messages = store.fetch_messages(&key).await?;
                let _ = tx.send(Inbound::Snapshot(messages));
                Ok::<(), anyhow::Error>(())
            }
        }));
    }

    pub fn set_periodic_refresh_enabled(&self, enabled: bool) {
        if let Some(refresh) = &self.refresh {
            refresh.set_enabled(enabled);
        }
    }

    pub fn periodic_refresh_enabled(&self) -> bool {
        self.refresh.as_ref().is_some_and(PeriodicRefresh::is_enabled)
    }

    pub fn messages(&self) -> &[Message] {
        self.feed.as_slice()
    }

    pub fn conversation_key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }

    /// Whether realtime delivery is active.
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Why the realtime subscription could not be set up, if it failed.
    pub fn realtime_error(&self) -> Option<&RealtimeError> {
        self.realtime_error.as_ref()
    }

    /// `SubscriptionFailed` if live updates never came up.
    pub fn ensure_live(&self) -> Result<()> {
        match &self.realtime_error {
            Some(e) => Err(SyncError::SubscriptionFailed(e.clone())),
            None => Ok(()),
        }
    }

    pub fn close(mut self) {
        self.shutdown();
        info!("Closed conversation {}", self.key);
    }

    fn apply(&mut self, input: Inbound<Message>) -> bool {
        match input {
            Inbound::Realtime(event) => self.apply_event(event),
            Inbound::Snapshot(messages) => {
                let key = &self.key;
                self.feed
                    .merge(messages.into_iter().filter(|m| &m.conversation_key == key))
                    > 0
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.release();
        }
        if let Some(refresh) = self.refresh.take() {
            refresh.cancel();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(content_type: &str) -> Attachment {
        Attachment {
            file_name: "week3.png".into(),
            size: 2048,
            content_type: content_type.into(),
            url: "https://files.example/week3.png".into(),
        }
    }

    #[test]
    fn blank_text_is_empty() {
        assert!(matches!(Draft::text("   ").content(), Err(SyncError::EmptyMessage)));
        assert!(matches!(Draft::default().content(), Err(SyncError::EmptyMessage)));
        assert!(Draft::default().is_empty());
    }

    #[test]
    fn file_kind_without_attachment() {
        let mut draft = Draft::text("see attached");
        draft.kind = MessageKind::Image;
        assert!(matches!(
            draft.content(),
            Err(SyncError::MissingAttachment(MessageKind::Image))
        ));

        draft.body.clear();
        assert!(matches!(draft.content(), Err(SyncError::EmptyMessage)));
    }

    #[test]
    fn attachment_kind_is_inferred_or_kept() {
        let draft = Draft::attachment(attachment("image/png"));
        assert_eq!(draft.kind, MessageKind::Image);
        assert_eq!(draft.content().unwrap().kind(), MessageKind::Image);

        let mut forced = Draft::text("");
        forced.attachment = Some(attachment("image/png"));
        forced.kind = MessageKind::File;
        assert_eq!(forced.content().unwrap().kind(), MessageKind::File);

        let mut inferred = Draft::text("");
        inferred.attachment = Some(attachment("application/pdf"));
        assert_eq!(inferred.content().unwrap().kind(), MessageKind::File);
    }

    #[test]
    fn consume_keeps_unsent_body() {
        let mut draft = Draft::attachment(attachment("image/png"));
        draft.body = "caption".into();
        let sent = draft.content().unwrap();
        draft.consume(&sent);
        assert_eq!(draft.body, "caption");
        assert!(draft.attachment.is_none());
        assert_eq!(draft.kind, MessageKind::Text);

        let sent = draft.content().unwrap();
        draft.consume(&sent);
        assert!(draft.is_empty());
    }
}
