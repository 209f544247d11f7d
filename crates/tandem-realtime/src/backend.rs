use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tandem_types::{
    CallInvite, CallStatus, CanonicalPair, Match, Message, NewMessage, Profile, TypingIndicator,
};

use crate::error::BackendError;

pub type BackendResult<T> = Result<T, BackendError>;

/// Row-level operations the realtime layer needs from its store.
///
/// The store only offers storage: no transactions span two calls and nothing
/// is pushed back to the client. Implementations exist for the embedded
/// database (`LocalBackend`) and for the REST surface (`HttpBackend`).
#[async_trait]
pub trait Backend: Send + Sync {
    // -- Likes, passes, blocks --

    /// Returns false when the like already existed.
    async fn insert_like(&self, from: Uuid, to: Uuid) -> BackendResult<bool>;

    async fn like_exists(&self, from: Uuid, to: Uuid) -> BackendResult<bool>;

    async fn insert_pass(&self, user: Uuid, target: Uuid) -> BackendResult<()>;

    async fn insert_block(&self, blocker: Uuid, blocked: Uuid) -> BackendResult<()>;

    /// True if either user blocked the other.
    async fn is_blocked(&self, a: Uuid, b: Uuid) -> BackendResult<bool>;

    async fn discovery_exclusions(&self, user: Uuid) -> BackendResult<Vec<Uuid>>;

    // -- Matches --

    /// Creates the match for `pair` if absent and returns the stored row.
    async fn upsert_match(&self, pair: CanonicalPair) -> BackendResult<Match>;

    async fn get_match(&self, id: Uuid) -> BackendResult<Option<Match>>;

    async fn matches_for_user(&self, user: Uuid) -> BackendResult<Vec<Match>>;

    // -- Messages --

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<Message>;

    /// Oldest first.
    async fn messages(&self, match_id: Uuid) -> BackendResult<Vec<Message>>;

    async fn mark_read(&self, match_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> BackendResult<usize>;

    // -- Typing --

    async fn upsert_typing(&self, match_id: Uuid, user: Uuid, at: DateTime<Utc>) -> BackendResult<()>;

    async fn delete_typing(&self, match_id: Uuid, user: Uuid) -> BackendResult<()>;

    async fn typing(&self, match_id: Uuid, user: Uuid) -> BackendResult<Option<TypingIndicator>>;

    // -- Call invites --

    /// Returns the row as stored; `created_at` may be restamped by the store.
    async fn insert_invite(&self, invite: &CallInvite) -> BackendResult<CallInvite>;

    async fn invite(&self, id: Uuid) -> BackendResult<Option<CallInvite>>;

    async fn ringing_invite_for_match(&self, match_id: Uuid, callee: Uuid) -> BackendResult<Option<CallInvite>>;

    async fn ringing_invite_for_callee(&self, callee: Uuid) -> BackendResult<Option<CallInvite>>;

    /// Unconditional; the last write wins.
    async fn update_invite_status(&self, id: Uuid, status: CallStatus) -> BackendResult<()>;

    // -- Profiles and devices --

    async fn profile(&self, user: Uuid) -> BackendResult<Option<Profile>>;

    async fn upsert_device_token(&self, user: Uuid, token: &str) -> BackendResult<()>;
}
