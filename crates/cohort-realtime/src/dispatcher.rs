use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use cohort_types::{ChannelKey, RealtimeEvent};

use crate::client::{EventCallback, EventFilter};

/// Identifies one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct Registration {
    channel: ChannelKey,
    filter: EventFilter,
    callback: EventCallback,
}

/// Routes published row changes to the listeners of a channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    next_id: AtomicU64,

    /// Listeners: handle -> (channel, filter, callback)
    registrations: RwLock<HashMap<SubscriptionHandle, Registration>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                next_id: AtomicU64::new(1),
                registrations: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a listener for one channel.
    pub fn subscribe(
        &self,
        channel: ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                handle,
                Registration {
                    channel,
                    filter,
                    callback,
                },
            );
        handle
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
            .is_some()
    }

    /// Deliver an event to every matching listener of `channel`.
    /// Returns the number of listeners it reached.
    pub fn publish(&self, channel: &ChannelKey, event: RealtimeEvent) -> usize {
        // Collect first: callbacks run without the lock held so they may
        // subscribe or unsubscribe themselves.
        let targets: Vec<EventCallback> = {
            let registrations = self
                .inner
                .registrations
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            registrations
                .values()
                .filter(|r| &r.channel == channel && r.filter.matches(&event))
                .map(|r| r.callback.clone())
                .collect()
        };

        trace!("Publishing {:?} on {} to {} listeners", event.operation, channel, targets.len());
        for callback in &targets {
            callback(event.clone());
        }
        targets.len()
    }

    /// Total number of live listeners.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live listeners on one channel.
    pub fn channel_subscribers(&self, channel: &ChannelKey) -> usize {
        self.inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| &r.channel == channel)
            .count()
    }
}
