use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, error};

use cohort_types::api::{Claims, SendMessageRequest};
use cohort_types::{ChannelKey, ConversationKey, DataAccess, NewMessage, RealtimeEvent};

use crate::auth::AppState;

/// Parse the path key and make sure the caller is one of its participants.
fn participant_key(raw: &str, claims: &Claims) -> Result<ConversationKey, StatusCode> {
    let key = ConversationKey::parse(raw).map_err(|_| StatusCode::BAD_REQUEST)?;
    if !key.includes(&claims.sub) {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(key)
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let key = participant_key(&key, &claims)?;

    let messages = state.store.fetch_messages(&key).await.map_err(|e| {
        error!("Failed to load messages for {}: {:#}", key, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let key = participant_key(&key, &claims)?;

    if key.other(&claims.sub) != Some(req.recipient_id.as_str()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.content.is_blank() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = state
        .store
        .create_message(NewMessage {
            sender_id: claims.sub.clone(),
            recipient_id: req.recipient_id,
            conversation_key: key.clone(),
            content: req.content,
        })
        .await
        .map_err(|e| {
            error!("Failed to store message in {}: {:#}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let reached = state.dispatcher.publish(
        &ChannelKey::conversation(&key),
        RealtimeEvent::message_inserted(message.clone()),
    );
    debug!("Message {} in {} reached {} listeners", message.id, key, reached);

    Ok((StatusCode::CREATED, Json(message)))
}
