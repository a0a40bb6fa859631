use std::sync::Arc;

use tracing::warn;

use cohort_realtime::{
    EventCallback, EventFilter, RealtimeClient, RealtimeError, SubscriptionGuard,
};
use cohort_types::{ChannelKey, DataAccess};

use crate::config::SyncConfig;
use crate::toast::ToastDispatcher;

/// Collaborators shared by every manager a presentation layer opens.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn DataAccess>,
    pub realtime: Arc<dyn RealtimeClient>,
    pub toasts: ToastDispatcher,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn DataAccess>,
        realtime: Arc<dyn RealtimeClient>,
        toasts: ToastDispatcher,
    ) -> Self {
        Self {
            store,
            realtime,
            toasts,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe, or record why live updates are unavailable. A manager that
    /// cannot subscribe still works from reloads and the refresh fallback.
    pub(crate) async fn subscribe(
        &self,
        channel: ChannelKey,
        filter: EventFilter,
        callback: EventCallback,
    ) -> (Option<SubscriptionGuard>, Option<RealtimeError>) {
        let subscribed =
            SubscriptionGuard::subscribe(self.realtime.clone(), channel.clone(), filter, callback)
                .await;
        match subscribed {
            Ok(guard) => (Some(guard), None),
            Err(e) => {
                warn!("Live updates unavailable on {}: {}", channel, e);
                self.toasts
                    .error("Live updates are unavailable, refreshing periodically instead");
                (None, Some(e))
            }
        }
    }
}
