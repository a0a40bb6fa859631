use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use cohort_realtime::{Dispatcher, EventCallback, EventFilter, SubscriptionHandle};
use cohort_types::ChannelKey;
use cohort_types::events::GatewayFrame;

/// Outcome of a Subscribe command.
#[derive(Debug, Default)]
pub struct SubscribeOutcome {
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, String)>,
}

/// Channel subscriptions held by one gateway connection.
///
/// Every listener forwards into the connection's outbound queue. All of them
/// are removed from the dispatcher when this is dropped, however the
/// connection ends.
pub struct ConnectionSubscriptions {
    dispatcher: Dispatcher,
    user_id: String,
    outbound: mpsc::UnboundedSender<GatewayFrame>,
    handles: HashMap<ChannelKey, SubscriptionHandle>,
}

impl ConnectionSubscriptions {
    pub fn new(
        dispatcher: Dispatcher,
        user_id: String,
        outbound: mpsc::UnboundedSender<GatewayFrame>,
    ) -> Self {
        Self {
            dispatcher,
            user_id,
            outbound,
            handles: HashMap::new(),
        }
    }

    pub fn subscribe_all(&mut self, channels: Vec<String>) -> SubscribeOutcome {
        let mut outcome = SubscribeOutcome::default();

        for raw in channels {
            let Some(channel) = ChannelKey::parse(&raw) else {
                outcome.rejected.push((raw, "unknown channel".into()));
                continue;
            };
            if !channel.is_visible_to(&self.user_id) {
                outcome.rejected.push((raw, "forbidden".into()));
                continue;
            }
            if !self.handles.contains_key(&channel) {
                let handle = self.dispatcher.subscribe(
                    channel.clone(),
                    EventFilter::all(),
                    self.forwarder(channel.clone()),
                );
                self.handles.insert(channel, handle);
            }
            outcome.accepted.push(raw);
        }

        outcome
    }

    pub fn unsubscribe_all(&mut self, channels: &[String]) {
        for raw in channels {
            let Some(channel) = ChannelKey::parse(raw) else {
                continue;
            };
            if let Some(handle) = self.handles.remove(&channel) {
                self.dispatcher.unsubscribe(handle);
                debug!("{} left {}", self.user_id, channel);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn forwarder(&self, channel: ChannelKey) -> EventCallback {
        let outbound = self.outbound.clone();
        Arc::new(move |event| {
            let _ = outbound.send(GatewayFrame::Change {
                channel: channel.clone(),
                event,
            });
        })
    }
}

impl Drop for ConnectionSubscriptions {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            self.dispatcher.unsubscribe(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use cohort_types::{Notification, NotificationKind, RealtimeEvent};

    use super::*;

    fn notification(user: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: user.into(),
            kind: NotificationKind::ClarityCall,
            title: "Clarity call booked".into(),
            body: "Thursday 5pm".into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_foreign_and_malformed_channels() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut subs = ConnectionSubscriptions::new(dispatcher.clone(), "alice".into(), tx);

        let outcome = subs.subscribe_all(vec![
            "notifications:alice".into(),
            "notifications:bob".into(),
            "messages:alice:bob".into(),
            "messages:bob:carol".into(),
            "typing:alice".into(),
        ]);

        assert_eq!(outcome.accepted, ["notifications:alice", "messages:alice:bob"]);
        let reasons: Vec<_> = outcome.rejected.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(reasons, ["forbidden", "forbidden", "unknown channel"]);
        assert_eq!(dispatcher.subscription_count(), 2);
    }

    #[test]
    fn forwards_changes_and_cleans_up_on_drop() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subs = ConnectionSubscriptions::new(dispatcher.clone(), "alice".into(), tx);
        subs.subscribe_all(vec!["notifications:alice".into(), "notifications:alice".into()]);
        assert_eq!(subs.len(), 1);

        let channel = ChannelKey::notifications("alice");
        dispatcher.publish(&channel, RealtimeEvent::notification_inserted(notification("alice")));
        match rx.try_recv().unwrap() {
            GatewayFrame::Change { channel: c, event } => {
                assert_eq!(c, channel);
                assert!(event.inserted_notification().is_some());
            }
            other => panic!("unexpected frame {:?}", other),
        }

        drop(subs);
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut subs = ConnectionSubscriptions::new(dispatcher.clone(), "alice".into(), tx);
        subs.subscribe_all(vec!["notifications:alice".into()]);
        subs.unsubscribe_all(&["notifications:alice".to_string()]);
        assert!(subs.is_empty());
        assert_eq!(dispatcher.subscription_count(), 0);
    }
}
