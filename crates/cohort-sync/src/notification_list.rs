use chrono::{DateTime, Utc};
use uuid::Uuid;

use cohort_types::Notification;

fn order_key(n: &Notification) -> (DateTime<Utc>, Uuid) {
    (n.created_at, n.id)
}

/// A user's notifications, newest first, with a cached unread counter.
///
/// Every mutation goes through this type so the counter cannot drift from
/// the list.
#[derive(Debug, Default)]
pub struct NotificationList {
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_notifications(notifications: impl IntoIterator<Item = Notification>) -> Self {
        let mut list = Self::new();
        list.merge(notifications);
        list
    }

    /// Insert at its ordered position. Returns false for a known id.
    pub fn insert(&mut self, notification: Notification) -> bool {
        if self.position(notification.id).is_some() {
            return false;
        }
        let key = order_key(&notification);
        let at = self.items.partition_point(|n| order_key(n) > key);
        if !notification.read {
            self.unread += 1;
        }
        self.items.insert(at, notification);
        self.check();
        true
    }

    /// Union with a fetched list. A row read on either side stays read.
    /// Returns how many rows were added or changed.
    pub fn merge(&mut self, notifications: impl IntoIterator<Item = Notification>) -> usize {
        let mut changed = 0;
        for notification in notifications {
            match self.position(notification.id) {
                Some(i) => {
                    if notification.read && !self.items[i].read {
                        self.set_read(notification.id, true);
                        changed += 1;
                    }
                }
                None => {
                    self.insert(notification);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Set the local read flag. Returns the previous value, or `None` for an
    /// unknown id.
    pub fn set_read(&mut self, id: Uuid, read: bool) -> Option<bool> {
        let i = self.position(id)?;
        let previous = self.items[i].read;
        if previous != read {
            self.items[i].read = read;
            if read {
                self.unread -= 1;
            } else {
                self.unread += 1;
            }
        }
        self.check();
        Some(previous)
    }

    pub fn get(&self, id: Uuid) -> Option<&Notification> {
        self.position(id).map(|i| &self.items[i])
    }

    pub fn unread_ids(&self) -> Vec<Uuid> {
        self.items.iter().filter(|n| !n.read).map(|n| n.id).collect()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Unread count computed from the rows themselves.
    pub fn recount(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    pub fn as_slice(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }

    fn check(&self) {
        debug_assert_eq!(self.unread, self.recount(), "unread counter drifted");
    }
}
