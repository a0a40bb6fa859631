use thiserror::Error;
use uuid::Uuid;

use cohort_realtime::RealtimeError;
use cohort_types::{IdError, MessageKind};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid participants: {0}")]
    InvalidParticipants(IdError),

    #[error("Invalid user: {0}")]
    InvalidUser(IdError),

    #[error("Message has no body and no attachment")]
    EmptyMessage,

    #[error("A {} message needs an attachment", .0.as_str())]
    MissingAttachment(MessageKind),

    #[error("No accountability partnership for {0}")]
    NoPartnership(String),

    #[error("Load failed: {0:#}")]
    LoadFailed(anyhow::Error),

    #[error("Send failed: {0:#}")]
    SendFailed(anyhow::Error),

    #[error("Update failed: {0:#}")]
    UpdateFailed(anyhow::Error),

    #[error("{} notification(s) were not updated", .failed.len())]
    PartialUpdateFailed { failed: Vec<Uuid> },

    /// Managers still open without live updates; `ensure_live` reports it.
    #[error("Realtime subscription failed: {0}")]
    SubscriptionFailed(#[from] RealtimeError),
}

impl SyncError {
    /// Raised before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParticipants(_)
                | Self::InvalidUser(_)
                | Self::EmptyMessage
                | Self::MissingAttachment(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
