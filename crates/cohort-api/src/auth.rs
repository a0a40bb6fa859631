use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};

use cohort_db::SqliteStore;
use cohort_realtime::Dispatcher;
use cohort_types::api::Claims;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: SqliteStore,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    /// Shared secret for server-side triggers (notifications, partnerships).
    pub service_key: String,
}

/// Mint an access token the way the external auth provider does.
/// Used by local tooling and tests; production tokens come from the provider.
pub fn issue_token(
    secret: &str,
    user_id: &str,
    name: &str,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
