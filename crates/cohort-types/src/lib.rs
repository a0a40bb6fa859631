/// Shared types for CohortHub.
///
/// Data model rows, realtime event envelopes, gateway wire frames, REST DTOs
/// and the data access contract that both the server-side store and the
/// remote HTTP client implement.

pub mod access;
pub mod api;
pub mod events;
pub mod models;

pub use access::DataAccess;
pub use events::{ChangeOperation, ChannelKey, RealtimeEvent, Record, Table};
pub use models::{
    Attachment, ConversationKey, IdError, Message, MessageContent, MessageKind, NewMessage,
    NewNotification, NewPartnership, Notification, NotificationKind, Partnership, validate_user_id,
};
