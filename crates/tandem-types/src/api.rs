use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::CallStatus;

// -- JWT Claims --

/// Bearer token claims. Tokens are minted by the external auth service; this
/// workspace only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Likes, passes, blocks --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LikeRequest {
    pub to_user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    /// False when the like already existed.
    pub inserted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

// -- Matches --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertMatchRequest {
    pub user1_id: Uuid,
    pub user2_id: Uuid,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Calls --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateInviteStatusRequest {
    pub status: CallStatus,
}

// -- Devices --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTokenRequest {
    pub token: String,
}
