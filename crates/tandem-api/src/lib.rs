//! REST surface over the tandem row store.
//!
//! Every route requires a bearer token; the acting user is always the
//! token's subject, never a request field.

pub mod auth;
pub mod calls;
pub mod likes;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod push;
pub mod sweep;
pub mod typing;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/likes", post(likes::create_like))
        .route("/likes/{from}/{to}", get(likes::like_exists))
        .route("/passes", post(likes::create_pass))
        .route("/blocks", post(likes::create_block))
        .route("/blocks/{a}/{b}", get(likes::block_exists))
        .route("/matches", post(matches::upsert_match))
        .route("/matches/{match_id}", get(matches::get_match))
        .route(
            "/matches/{match_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/matches/{match_id}/read", post(messages::mark_read))
        .route(
            "/matches/{match_id}/typing",
            put(typing::set_typing).delete(typing::clear_typing),
        )
        .route("/matches/{match_id}/typing/{user_id}", get(typing::get_typing))
        .route("/calls", post(calls::create_invite))
        .route(
            "/calls/{invite_id}",
            get(calls::get_invite).patch(calls::update_invite_status),
        )
        .route("/users/{user_id}", get(users::get_profile))
        .route("/users/{user_id}/matches", get(matches::matches_for_user))
        .route("/users/{user_id}/exclusions", get(likes::discovery_exclusions))
        .route("/users/{user_id}/calls/ringing", get(calls::ringing_invite))
        .route("/users/{user_id}/device-token", put(users::register_device_token))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
