use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info};

use cohort_types::api::Claims;
use cohort_types::{ConversationKey, DataAccess, NewPartnership};

use crate::auth::AppState;

pub async fn get_partnership(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let partnership = state
        .store
        .fetch_partnership(&claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to load partnership for {}: {:#}", claims.sub, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(partnership))
}

pub async fn create_partnership(
    State(state): State<AppState>,
    Json(req): Json<NewPartnership>,
) -> Result<impl IntoResponse, StatusCode> {
    // Same validation as a conversation: two distinct, well-formed ids.
    ConversationKey::between(&req.student_a, &req.student_b)
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let partnership = state
        .store
        .run(move |db| db.insert_partnership(&req))
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                return StatusCode::CONFLICT;
            }
            error!("Failed to store partnership: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!(
        "Partnership {} between {} and {} ({})",
        partnership.id, partnership.student_a, partnership.student_b, partnership.track
    );
    Ok((StatusCode::CREATED, Json(partnership)))
}

fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>()
        .and_then(rusqlite::Error::sqlite_error_code)
        == Some(rusqlite::ErrorCode::ConstraintViolation)
}
