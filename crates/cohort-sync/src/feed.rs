use std::collections::HashSet;

use uuid::Uuid;

use cohort_types::Message;

/// Ordered, duplicate-free message list of one conversation.
///
/// Kept sorted by `(created_at, id)` ascending. The same row can arrive
/// through the send echo, the realtime channel and a refresh snapshot; only
/// the first copy is kept.
#[derive(Debug, Default)]
pub struct MessageFeed {
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut feed = Self::new();
        feed.merge(messages);
        feed
    }

    /// Insert at its ordered position. Returns false for a known id.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        let key = message.order_key();
        let at = self.messages.partition_point(|m| m.order_key() <= key);
        self.messages.insert(at, message);
        true
    }

    /// Union with a fetched list. Returns how many rows were new.
    pub fn merge(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut added = 0;
        for message in messages {
            if self.insert(message) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
