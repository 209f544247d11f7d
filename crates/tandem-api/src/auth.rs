use std::sync::Arc;

use axum::http::StatusCode;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::error;
use uuid::Uuid;

use tandem_db::Database;
use tandem_types::api::Claims;

use crate::push::PushNotifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Set when a push webhook is configured.
    pub push: Option<PushNotifier>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>, push: Option<PushNotifier>) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret: jwt_secret.into(),
            push,
        })
    }
}

/// Signs a bearer token for `user_id`. Tokens normally come from the
/// external auth service; this mints compatible ones for tooling and tests.
pub fn create_token(
    secret: &str,
    user_id: Uuid,
    ttl: chrono::Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (chrono::Utc::now() + ttl).timestamp() as usize;
    let claims = Claims { sub: user_id, exp };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Runs a database closure on the blocking pool, logging failures and
/// mapping them to 500.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// 403 unless `user` is the authenticated caller.
pub(crate) fn ensure_self(claims: &Claims, user: Uuid) -> Result<(), StatusCode> {
    if claims.sub == user {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}
