use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use cohort_realtime::{EventFilter, RealtimeError, SubscriptionGuard};
use cohort_types::{ChannelKey, Notification, RealtimeEvent, Table, validate_user_id};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::inbox::{Inbound, Inbox};
use crate::notification_list::NotificationList;
use crate::refresh::PeriodicRefresh;

/// Live notification list of one user with unread bookkeeping.
pub struct NotificationCenter {
    ctx: SyncContext,
    user_id: String,
    list: NotificationList,
    inbox: Inbox<Notification>,
    subscription: Option<SubscriptionGuard>,
    realtime_error: Option<RealtimeError>,
    refresh: Option<PeriodicRefresh>,
}

impl NotificationCenter {
    pub async fn open(ctx: SyncContext, user_id: &str) -> Result<Self> {
        validate_user_id(user_id).map_err(SyncError::InvalidUser)?;

        let inbox = Inbox::new();
        let (subscription, realtime_error) = ctx
            .subscribe(
                ChannelKey::notifications(user_id),
                EventFilter::inserts(Table::Notifications),
                inbox.realtime_callback(),
            )
            .await;

        let notifications = ctx.store.fetch_notifications(user_id).await.map_err(|e| {
            warn!("Failed to load notifications for {}: {:#}", user_id, e);
            SyncError::LoadFailed(e)
        })?;
        let list = NotificationList::from_notifications(notifications);
        info!(
            "Opened notifications for {} ({} total, {} unread)",
            user_id,
            list.len(),
            list.unread_count()
        );

        let mut center = Self {
            user_id: user_id.to_string(),
            list,
            inbox,
            subscription,
            realtime_error,
            refresh: None,
            ctx,
        };
        if center.ctx.config.periodic_refresh {
            center.enable_periodic_refresh(center.ctx.config.refresh_interval);
        }
        Ok(center)
    }

    /// Mark one notification read. Unknown or already-read ids are a no-op
    /// and return `Ok(false)` without touching the network.
    pub async fn mark_as_read(&mut self, id: Uuid) -> Result<bool> {
        match self.list.get(id) {
            Some(n) if !n.read => {}
            _ => return Ok(false),
        }

        self.list.set_read(id, true);
        match self.ctx.store.update_notification_read_flag(id, true).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Failed to mark notification {} read: {:#}", id, e);
                self.list.set_read(id, false);
                self.ctx.toasts.error("Could not mark notification as read");
                Err(SyncError::UpdateFailed(e))
            }
        }
    }

    /// Mark every unread notification read in one bulk call.
    ///
    /// Rows the response does not confirm are flipped back and named in
    /// `PartialUpdateFailed`. Returns how many rows were confirmed.
    pub async fn mark_all_as_read(&mut self) -> Result<usize> {
        let ids = self.list.unread_ids();
        if ids.is_empty() {
            return Ok(0);
        }
        for id in &ids {
            self.list.set_read(*id, true);
        }

        let updated = match self
            .ctx
            .store
            .bulk_update_notification_read_flags(&self.user_id, &ids, true)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Bulk read for {} failed: {:#}", self.user_id, e);
                for id in &ids {
                    self.list.set_read(*id, false);
                }
                self.ctx.toasts.error("Could not mark notifications as read");
                return Err(SyncError::UpdateFailed(e));
            }
        };

        let confirmed: HashSet<Uuid> = updated.iter().filter(|n| n.read).map(|n| n.id).collect();
        let failed: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| !confirmed.contains(id))
            .collect();
        for id in &failed {
            self.list.set_read(*id, false);
        }

        if failed.is_empty() {
            Ok(ids.len())
        } else {
            warn!(
                "Bulk read for {} left {} of {} unread",
                self.user_id,
                failed.len(),
                ids.len()
            );
            self.ctx
                .toasts
                .error(format!("{} notification(s) could not be marked as read", failed.len()));
            Err(SyncError::PartialUpdateFailed { failed })
        }
    }

    /// Apply one realtime event. Returns true if the list changed.
    pub fn apply_event(&mut self, event: RealtimeEvent) -> bool {
        match event.inserted_notification() {
            Some(n) if n.user_id == self.user_id => self.list.insert(n.clone()),
            _ => false,
        }
    }

    pub fn pump(&mut self) -> usize {
        let mut changed = 0;
        while let Some(input) = self.inbox.try_next() {
            if self.apply(input) {
                changed += 1;
            }
        }
        changed
    }

    pub async fn recv(&mut self) -> bool {
        match self.inbox.next().await {
            Some(input) => self.apply(input),
            None => false,
        }
    }

    /// Manual full reload; on failure the list is emptied.
    pub async fn reload(&mut self) -> Result<usize> {
        match self.ctx.store.fetch_notifications(&self.user_id).await {
            Ok(notifications) => {
                self.list = NotificationList::from_notifications(notifications);
                Ok(self.list.len())
            }
            Err(e) => {
                warn!("Reload of notifications for {} failed: {:#}", self.user_id, e);
                self.list.clear();
                self.ctx.toasts.error("Could not load notifications");
                Err(SyncError::LoadFailed(e))
            }
        }
    }

    pub fn enable_periodic_refresh(&mut self, interval: Duration) {
        let store = self.ctx.store.clone();
        let user_id = self.user_id.clone();
        let tx = self.inbox.sender();

        self.refresh = Some(PeriodicRefresh::spawn(interval, true, move || {
            let store = store.clone();
            let user_id = user_id.clone();
            let tx = tx.clone();
            async move {
                let notifications = store.fetch_notifications(&user_id).await?;
                let _ = tx.send(Inbound::Snapshot(notifications));
                Ok::<(), anyhow::Error>(())
            }
        }));
    }

    pub fn set_periodic_refresh_enabled(&self, enabled: bool) {
        if let Some(refresh) = &self.refresh {
            refresh.set_enabled(enabled);
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        self.list.as_slice()
    }

    pub fn unread_count(&self) -> usize {
        self.list.unread_count()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

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
        info!("Closed notifications for {}", self.user_id);
    }

    fn apply(&mut self, input: Inbound<Notification>) -> bool {
        match input {
            Inbound::Realtime(event) => self.apply_event(event),
            Inbound::Snapshot(notifications) => {
                let user_id = &self.user_id;
                self.list
                    .merge(notifications.into_iter().filter(|n| &n.user_id == user_id))
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

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
