use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageContent;

// -- JWT Claims --

/// JWT claims shared across cohort-api (REST middleware) and the gateway
/// upgrade route. Tokens are minted by the external auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub content: MessageContent,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReadRequest {
    pub read: bool,
}

/// Most ids one bulk read request may carry.
pub const MAX_BULK_READ_IDS: usize = 500;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkReadRequest {
    pub ids: Vec<Uuid>,
    pub read: bool,
}

// -- Gateway --

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}
