use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use tandem_types::api::{Claims, MarkReadResponse, SendMessageRequest};
use tandem_types::models::MAX_MESSAGE_LEN;

use crate::auth::{AppState, blocking};
use crate::matches::participant_match;
use crate::push;

pub async fn send_message(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let matched = participant_match(&state, match_id, claims.sub).await?;
    let sender = claims.sub;
    let recipient = matched.other_user(sender).ok_or(StatusCode::FORBIDDEN)?;

    if blocking(&state, move |db| db.is_blocked(sender, recipient)).await? {
        return Err(StatusCode::FORBIDDEN);
    }

    let client_id = req.client_id;
    let message = blocking(&state, move |db| {
        db.insert_message(Uuid::new_v4(), match_id, sender, &content, client_id, Utc::now())?
            .into_model()
    })
    .await?;

    push::message_created(&state, &message, recipient);

    Ok((StatusCode::CREATED, Json(message)))
}

/// The whole conversation, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    participant_match(&state, match_id, claims.sub).await?;
    let messages = blocking(&state, move |db| {
        db.get_messages(match_id)?
            .into_iter()
            .map(|row| row.into_model())
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    participant_match(&state, match_id, claims.sub).await?;
    let reader = claims.sub;
    let updated = blocking(&state, move |db| db.mark_read(match_id, reader, Utc::now())).await?;
    Ok(Json(MarkReadResponse { updated }))
}
