use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tandem_db::Database;
use tandem_db::models::CallInviteRow;
use tandem_types::{
    CallInvite, CallStatus, CanonicalPair, Match, Message, NewMessage, Profile, TypingIndicator,
};

use crate::backend::{Backend, BackendResult};

/// Backend over an embedded database. Every call runs on the blocking pool so
/// SQLite never stalls the async runtime.
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Database>,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    async fn blocking<F, T>(&self, f: F) -> BackendResult<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db)).await?;
        Ok(result?)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn insert_like(&self, from: Uuid, to: Uuid) -> BackendResult<bool> {
        self.blocking(move |db| db.insert_like(from, to, Utc::now())).await
    }

    async fn like_exists(&self, from: Uuid, to: Uuid) -> BackendResult<bool> {
        self.blocking(move |db| db.like_exists(from, to)).await
    }

    async fn insert_pass(&self, user: Uuid, target: Uuid) -> BackendResult<()> {
        self.blocking(move |db| db.insert_pass(user, target, Utc::now()).map(|_| ()))
            .await
    }

    async fn insert_block(&self, blocker: Uuid, blocked: Uuid) -> BackendResult<()> {
        self.blocking(move |db| db.insert_block(blocker, blocked, Utc::now()).map(|_| ()))
            .await
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> BackendResult<bool> {
        self.blocking(move |db| db.is_blocked(a, b)).await
    }

    async fn discovery_exclusions(&self, user: Uuid) -> BackendResult<Vec<Uuid>> {
        self.blocking(move |db| {
            db.discovery_exclusions(user)?
                .iter()
                .map(|id| id.parse::<Uuid>().map_err(anyhow::Error::from))
                .collect()
        })
        .await
    }

    async fn upsert_match(&self, pair: CanonicalPair) -> BackendResult<Match> {
        self.blocking(move |db| db.upsert_match(pair, Utc::now())?.into_model())
            .await
    }

    async fn get_match(&self, id: Uuid) -> BackendResult<Option<Match>> {
        self.blocking(move |db| db.get_match(id)?.map(|row| row.into_model()).transpose())
            .await
    }

    async fn matches_for_user(&self, user: Uuid) -> BackendResult<Vec<Match>> {
        self.blocking(move |db| {
            db.matches_for_user(user)?
                .into_iter()
                .map(|row| row.into_model())
                .collect()
        })
        .await
    }

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<Message> {
        let message = message.clone();
        self.blocking(move |db| {
            db.insert_message(
                Uuid::new_v4(),
                message.match_id,
                message.sender_id,
                &message.content,
                message.client_id,
                Utc::now(),
            )?
            .into_model()
        })
        .await
    }

    async fn messages(&self, match_id: Uuid) -> BackendResult<Vec<Message>> {
        self.blocking(move |db| {
            db.get_messages(match_id)?
                .into_iter()
                .map(|row| row.into_model())
                .collect()
        })
        .await
    }

    async fn mark_read(&self, match_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> BackendResult<usize> {
        self.blocking(move |db| db.mark_read(match_id, reader, at)).await
    }

    async fn upsert_typing(&self, match_id: Uuid, user: Uuid, at: DateTime<Utc>) -> BackendResult<()> {
        self.blocking(move |db| db.upsert_typing(match_id, user, at)).await
    }

    async fn delete_typing(&self, match_id: Uuid, user: Uuid) -> BackendResult<()> {
        self.blocking(move |db| db.delete_typing(match_id, user)).await
    }

    async fn typing(&self, match_id: Uuid, user: Uuid) -> BackendResult<Option<TypingIndicator>> {
        self.blocking(move |db| {
            db.get_typing(match_id, user)?
                .map(|row| row.into_model())
                .transpose()
        })
        .await
    }

    async fn insert_invite(&self, invite: &CallInvite) -> BackendResult<CallInvite> {
        let row = CallInviteRow::from_model(invite);
        self.blocking(move |db| {
            db.insert_invite(&row)?;
            row.into_model()
        })
        .await
    }

    async fn invite(&self, id: Uuid) -> BackendResult<Option<CallInvite>> {
        self.blocking(move |db| db.get_invite(id)?.map(|row| row.into_model()).transpose())
            .await
    }

    async fn ringing_invite_for_match(&self, match_id: Uuid, callee: Uuid) -> BackendResult<Option<CallInvite>> {
        self.blocking(move |db| {
            db.ringing_invite_for_match(match_id, callee)?
                .map(|row| row.into_model())
                .transpose()
        })
        .await
    }

    async fn ringing_invite_for_callee(&self, callee: Uuid) -> BackendResult<Option<CallInvite>> {
        self.blocking(move |db| {
            db.ringing_invite_for_callee(callee)?
                .map(|row| row.into_model())
                .transpose()
        })
        .await
    }

    async fn update_invite_status(&self, id: Uuid, status: CallStatus) -> BackendResult<()> {
        self.blocking(move |db| {
            if !db.update_invite_status(id, status)? {
                anyhow::bail!("call invite {} not found", id);
            }
            Ok(())
        })
        .await
    }

    async fn profile(&self, user: Uuid) -> BackendResult<Option<Profile>> {
        self.blocking(move |db| db.get_user(user)?.map(|row| row.into_model()).transpose())
            .await
    }

    async fn upsert_device_token(&self, user: Uuid, token: &str) -> BackendResult<()> {
        let token = token.to_string();
        self.blocking(move |db| db.upsert_device_token(user, &token, Utc::now()))
            .await
    }
}
