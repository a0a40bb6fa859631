/// CohortHub realtime layer.
///
/// A channel-keyed publish/subscribe primitive (`Dispatcher`) plus the
/// `RealtimeClient` contract the chat and notification managers consume.
/// The dispatcher is the in-process implementation; the sync crate adds one
/// that rides the gateway WebSocket.

pub mod client;
pub mod dispatcher;

pub use client::{EventCallback, EventFilter, RealtimeClient, RealtimeError, SubscriptionGuard};
pub use dispatcher::{Dispatcher, SubscriptionHandle};
