use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use tandem_db::models::CallInviteRow;
use tandem_types::api::{Claims, UpdateInviteStatusRequest};
use tandem_types::{CallInvite, CallStatus};

use crate::auth::{AppState, blocking, ensure_self};
use crate::matches::participant_match;
use crate::push;

#[derive(Debug, Deserialize)]
pub struct RingingQuery {
    pub match_id: Option<Uuid>,
}

/// Stores a new ringing invite from the authenticated caller and pushes it
/// to the callee.
pub async fn create_invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(invite): Json<CallInvite>,
) -> Result<impl IntoResponse, StatusCode> {
    ensure_self(&claims, invite.caller_id)?;
    if invite.caller_id == invite.callee_id || invite.status != CallStatus::Ringing {
        return Err(StatusCode::BAD_REQUEST);
    }
    let matched = participant_match(&state, invite.match_id, invite.caller_id).await?;
    if matched.other_user(invite.caller_id) != Some(invite.callee_id) {
        return Err(StatusCode::BAD_REQUEST);
    }

    // The ring timeout and the sweep both run on the server clock.
    let row = CallInviteRow::from_model(&CallInvite {
        created_at: Utc::now(),
        ..invite
    });
    let invite = blocking(&state, move |db| {
        db.insert_invite(&row)?;
        row.into_model()
    })
    .await?;
    info!("Invite {} from {} to {}", invite.id, invite.caller_id, invite.callee_id);

    push::invite_created(&state, &invite);

    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn get_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let invite = load_invite(&state, invite_id).await?;
    ensure_participant(&invite, &claims)?;
    Ok(Json(invite))
}

/// Newest ringing invite for the caller of this request, optionally within
/// one match. JSON `null` when there is none.
pub async fn ringing_invite(
    State(state): State<AppState>,
    Path(callee): Path<Uuid>,
    Query(query): Query<RingingQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    ensure_self(&claims, callee)?;
    let invite = blocking(&state, move |db| {
        let row = match query.match_id {
            Some(match_id) => db.ringing_invite_for_match(match_id, callee)?,
            None => db.ringing_invite_for_callee(callee)?,
        };
        row.map(|r| r.into_model()).transpose()
    })
    .await?;
    Ok(Json(invite))
}

/// Unconditional status write by either participant; last write wins.
pub async fn update_invite_status(
    State(state): State<AppState>,
    Path(invite_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateInviteStatusRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let invite = load_invite(&state, invite_id).await?;
    ensure_participant(&invite, &claims)?;

    let status = req.status;
    if !blocking(&state, move |db| db.update_invite_status(invite_id, status)).await? {
        return Err(StatusCode::NOT_FOUND);
    }
    info!("Invite {} is now {}", invite_id, status.as_str());
    Ok(StatusCode::NO_CONTENT)
}

async fn load_invite(state: &AppState, invite_id: Uuid) -> Result<CallInvite, StatusCode> {
    blocking(state, move |db| {
        db.get_invite(invite_id)?.map(|row| row.into_model()).transpose()
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)
}

fn ensure_participant(invite: &CallInvite, claims: &Claims) -> Result<(), StatusCode> {
    if claims.sub == invite.caller_id || claims.sub == invite.callee_id {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}
