//! Student-side realtime core of CohortHub.
//!
//! `ChatSession` keeps a live, ordered, duplicate-free feed of one partner
//! conversation; `NotificationCenter` keeps a user's notifications with an
//! unread counter that never drifts from the list. Both load through a
//! `DataAccess` store, listen through a `RealtimeClient`, and fall back to
//! `PeriodicRefresh` when live delivery cannot be trusted.
//!
//! `HttpStore` and `GatewayClient` connect the managers to a running server;
//! tests plug in the SQLite store and the in-process dispatcher instead.

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod http;
mod inbox;
pub mod notification_list;
pub mod notifications;
pub mod refresh;
pub mod toast;

pub use chat::{ChatSession, Draft};
pub use config::{DEFAULT_REFRESH_INTERVAL, SyncConfig};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use feed::MessageFeed;
pub use gateway::GatewayClient;
pub use http::HttpStore;
pub use notification_list::NotificationList;
pub use notifications::NotificationCenter;
pub use refresh::{MIN_REFRESH_INTERVAL, PeriodicRefresh};
pub use toast::{Toast, ToastDispatcher, ToastLevel};
