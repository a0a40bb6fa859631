use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cohort_types::{ChangeOperation, ChannelKey, RealtimeEvent, Table};

use crate::dispatcher::{Dispatcher, SubscriptionHandle};

/// Listener invoked once per delivered event. Must not block.
pub type EventCallback = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("realtime connection closed")]
    Closed,
    #[error("subscription to {channel} rejected: {reason}")]
    Rejected { channel: String, reason: String },
    #[error("realtime connect failed: {0}")]
    Connect(String),
    #[error("no answer to subscription on {0}")]
    Timeout(String),
}

/// Which events of a channel a listener wants. `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub table: Option<Table>,
    pub operation: Option<ChangeOperation>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn inserts(table: Table) -> Self {
        Self {
            table: Some(table),
            operation: Some(ChangeOperation::Insert),
        }
    }

    pub fn matches(&self, event: &RealtimeEvent) -> bool {
        self.table.is_none_or(|t| t == event.table())
            && self.operation.is_none_or(|op| op == event.operation)
    }
}

/// Publish/subscribe primitive keyed by channel name.
///
/// `subscribe` resolves once the channel is established, so a remote
/// rejection surfaces as an error instead of a silent listener.
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    async fn subscribe(
        &self,
        channel: &ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<SubscriptionHandle, RealtimeError>;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}

#[async_trait]
impl RealtimeClient for Dispatcher {
    async fn subscribe(
        &self,
        channel: &ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<SubscriptionHandle, RealtimeError> {
        Ok(Dispatcher::subscribe(self, channel.clone(), filter, callback))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        Dispatcher::unsubscribe(self, handle);
    }
}

/// Owns one subscription and releases it when dropped.
pub struct SubscriptionGuard {
    client: Arc<dyn RealtimeClient>,
    channel: ChannelKey,
    handle: Option<SubscriptionHandle>,
}

impl SubscriptionGuard {
    pub async fn subscribe(
        client: Arc<dyn RealtimeClient>,
        channel: ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> Result<Self, RealtimeError> {
        let handle = client.subscribe(&channel, filter, callback).await?;
        debug!("Subscribed to {} ({:?})", channel, handle);
        Ok(Self {
            client,
            channel,
            handle: Some(handle),
        })
    }

    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    /// Unsubscribe now instead of at drop.
    pub fn release(mut self) {
        self.unsubscribe();
    }

    fn unsubscribe(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.unsubscribe(handle);
            debug!("Unsubscribed from {} ({:?})", self.channel, handle);
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
