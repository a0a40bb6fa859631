use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use cohort_types::api::{BulkReadRequest, Claims, MAX_BULK_READ_IDS, UpdateReadRequest};
use cohort_types::{ChannelKey, DataAccess, NewNotification, RealtimeEvent, validate_user_id};

use crate::auth::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let notifications = state
        .store
        .fetch_notifications(&claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to load notifications for {}: {:#}", claims.sub, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(notifications))
}

pub async fn update_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateReadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Read flags only move forward.
    if !req.read {
        return Err(StatusCode::BAD_REQUEST);
    }

    let existing = state
        .store
        .run(move |db| db.get_notification(id))
        .await
        .map_err(|e| {
            error!("Failed to load notification {}: {:#}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    match existing {
        Some(n) if n.user_id == claims.sub => {}
        _ => return Err(StatusCode::NOT_FOUND),
    }

    let updated = state
        .store
        .update_notification_read_flag(id, true)
        .await
        .map_err(|e| {
            error!("Failed to mark notification {} read: {:#}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    state.dispatcher.publish(
        &ChannelKey::notifications(&claims.sub),
        RealtimeEvent::notification_updated(updated.clone()),
    );

    Ok(Json(updated))
}

pub async fn bulk_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BulkReadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !req.read || req.ids.len() > MAX_BULK_READ_IDS {
        return Err(StatusCode::BAD_REQUEST);
    }

    let updated = state
        .store
        .bulk_update_notification_read_flags(&claims.sub, &req.ids, true)
        .await
        .map_err(|e| {
            error!("Bulk read for {} failed: {:#}", claims.sub, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let channel = ChannelKey::notifications(&claims.sub);
    for n in &updated {
        state
            .dispatcher
            .publish(&channel, RealtimeEvent::notification_updated(n.clone()));
    }

    Ok(Json(updated))
}

/// Server-side trigger: submission reviewed, partner active, call booked...
pub async fn create_notification(
    State(state): State<AppState>,
    Json(req): Json<NewNotification>,
) -> Result<impl IntoResponse, StatusCode> {
    validate_user_id(&req.user_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let notification = state
        .store
        .run(move |db| db.insert_notification(&req))
        .await
        .map_err(|e| {
            error!("Failed to store notification: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!(
        "Notification {} ({}) for {}",
        notification.id,
        notification.kind.as_str(),
        notification.user_id
    );
    state.dispatcher.publish(
        &ChannelKey::notifications(&notification.user_id),
        RealtimeEvent::notification_inserted(notification.clone()),
    );

    Ok((StatusCode::CREATED, Json(notification)))
}
