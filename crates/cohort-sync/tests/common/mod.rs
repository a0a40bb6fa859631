#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use cohort_realtime::{
    Dispatcher, EventCallback, EventFilter, RealtimeClient, RealtimeError, SubscriptionHandle,
};
use cohort_sync::{SyncConfig, SyncContext, ToastDispatcher};
use cohort_types::{
    ChannelKey, ConversationKey, DataAccess, Message, MessageContent, NewMessage, Notification,
    NotificationKind, Partnership,
};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn text_message(id: u128, from: &str, to: &str, secs: i64, body: &str) -> Message {
    Message {
        id: Uuid::from_u128(id),
        sender_id: from.into(),
        recipient_id: to.into(),
        conversation_key: ConversationKey::between(from, to).unwrap(),
        content: MessageContent::Text { body: body.into() },
        created_at: at(secs),
    }
}

pub fn notification(id: u128, user: &str, secs: i64, read: bool) -> Notification {
    Notification {
        id: Uuid::from_u128(id),
        user_id: user.into(),
        kind: NotificationKind::SubmissionFeedback,
        title: format!("Notification {id}"),
        body: "Your submission was reviewed".into(),
        read,
        created_at: at(secs),
    }
}

#[derive(Default)]
struct State {
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    partnerships: Vec<Partnership>,
    clock: i64,
}

/// In-memory `DataAccess` with failure switches and call counters.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<State>,
    pub fail_fetch: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_bulk: AtomicBool,
    /// Ids the bulk update silently leaves untouched.
    pub bulk_skips: Mutex<HashSet<Uuid>>,
    pub fetches: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub bulk_updates: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_message(&self, message: Message) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn add_notification(&self, notification: Notification) {
        self.state.lock().unwrap().notifications.push(notification);
    }

    pub fn add_partnership(&self, a: &str, b: &str) {
        self.state.lock().unwrap().partnerships.push(Partnership {
            id: Uuid::new_v4(),
            student_a: a.into(),
            student_b: b.into(),
            track: "backend".into(),
            created_at: at(0),
        });
    }

    pub fn skip_in_bulk(&self, id: Uuid) {
        self.bulk_skips.lock().unwrap().insert(id);
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn stored_notification(&self, id: Uuid) -> Option<Notification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }
}

#[async_trait]
impl DataAccess for MockStore {
    async fn fetch_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            bail!("connection reset");
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| &m.conversation_key == key)
            .cloned()
            .collect())
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            bail!("insert rejected");
        }
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let stored = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            conversation_key: message.conversation_key,
            content: message.content,
            created_at: at(1_000) + Duration::seconds(state.clock),
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn fetch_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            bail!("connection reset");
        }
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }

    async fn update_notification_read_flag(&self, id: Uuid, read: bool) -> Result<Notification> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.load(Ordering::SeqCst) {
            bail!("update timed out");
        }
        let mut state = self.state.lock().unwrap();
        let row = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| anyhow!("notification {} not found", id))?;
        row.read |= read;
        Ok(row.clone())
    }

    async fn bulk_update_notification_read_flags(
        &self,
        user_id: &str,
        ids: &[Uuid],
        read: bool,
    ) -> Result<Vec<Notification>> {
        self.bulk_updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk.load(Ordering::SeqCst) {
            bail!("bulk update timed out");
        }
        let skips = self.bulk_skips.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();
        let mut updated = Vec::new();
        for row in state.notifications.iter_mut() {
            if row.user_id == user_id && ids.contains(&row.id) && !skips.contains(&row.id) {
                row.read |= read;
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn fetch_partnership(&self, student_id: &str) -> Result<Option<Partnership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .partnerships
            .iter()
            .rev()
            .find(|p| p.student_a == student_id || p.student_b == student_id)
            .cloned())
    }
}

/// Realtime client whose channel never comes up.
pub struct OfflineRealtime;

#[async_trait]
impl RealtimeClient for OfflineRealtime {
    async fn subscribe(
        &self,
        _channel: &ChannelKey,
        _filter: EventFilter,
        _callback: EventCallback,
    ) -> Result<SubscriptionHandle, RealtimeError> {
        Err(RealtimeError::Connect("socket unreachable".into()))
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {}
}

pub fn no_refresh() -> SyncConfig {
    SyncConfig {
        periodic_refresh: false,
        ..SyncConfig::default()
    }
}

/// Context over the mock store and an in-process dispatcher, without the
/// refresh timer.
pub fn context(store: &Arc<MockStore>, dispatcher: &Dispatcher) -> SyncContext {
    SyncContext::new(
        store.clone(),
        Arc::new(dispatcher.clone()),
        ToastDispatcher::detached(),
    )
    .with_config(no_refresh())
}
