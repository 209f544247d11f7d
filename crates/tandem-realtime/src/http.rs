use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use tandem_types::api::{
    DeviceTokenRequest, ExistsResponse, LikeRequest, LikeResponse, MarkReadResponse,
    SendMessageRequest, TargetRequest, UpdateInviteStatusRequest, UpsertMatchRequest,
};
use tandem_types::{
    CallInvite, CallStatus, CanonicalPair, Match, Message, NewMessage, Profile, TypingIndicator,
};

use crate::backend::{Backend, BackendResult};
use crate::error::BackendError;

/// Backend over the `tandem-api` REST surface.
///
/// The server takes the acting user from the bearer token, so the
/// acting-user arguments of the trait methods (liker, sender, reader, typist)
/// must belong to the token's user. Timestamps are stamped by the server
/// clock; the `at` arguments of `mark_read` and `upsert_typing` and an
/// invite's `created_at` are not sent.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send(&self, req: RequestBuilder, path: &str) -> BackendResult<Response> {
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                status: resp.status().as_u16(),
                path: path.to_string(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let resp = self.send(self.request(Method::GET, path), path).await?;
        Ok(resp.json().await?)
    }

    /// GET where 404 means "no such row".
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> BackendResult<Option<T>> {
        let resp = self.request(Method::GET, path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                status: resp.status().as_u16(),
                path: path.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> BackendResult<T> {
        let resp = self.send(self.request(method, path).json(body), path).await?;
        Ok(resp.json().await?)
    }

    async fn send_empty<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> BackendResult<()> {
        let mut req = self.request(method, path);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send(req, path).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn insert_like(&self, _from: Uuid, to: Uuid) -> BackendResult<bool> {
        let resp: LikeResponse = self
            .send_json(Method::POST, "/likes", &LikeRequest { to_user_id: to })
            .await?;
        Ok(resp.inserted)
    }

    async fn like_exists(&self, from: Uuid, to: Uuid) -> BackendResult<bool> {
        let resp: ExistsResponse = self.get_json(&format!("/likes/{}/{}", from, to)).await?;
        Ok(resp.exists)
    }

    async fn insert_pass(&self, _user: Uuid, target: Uuid) -> BackendResult<()> {
        self.send_empty(Method::POST, "/passes", Some(&TargetRequest { target_id: target }))
            .await
    }

    async fn insert_block(&self, _blocker: Uuid, blocked: Uuid) -> BackendResult<()> {
        self.send_empty(Method::POST, "/blocks", Some(&TargetRequest { target_id: blocked }))
            .await
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> BackendResult<bool> {
        let resp: ExistsResponse = self.get_json(&format!("/blocks/{}/{}", a, b)).await?;
        Ok(resp.exists)
    }

    async fn discovery_exclusions(&self, user: Uuid) -> BackendResult<Vec<Uuid>> {
        self.get_json(&format!("/users/{}/exclusions", user)).await
    }

    async fn upsert_match(&self, pair: CanonicalPair) -> BackendResult<Match> {
        let body = UpsertMatchRequest {
            user1_id: pair.lo(),
            user2_id: pair.hi(),
        };
        self.send_json(Method::POST, "/matches", &body).await
    }

    async fn get_match(&self, id: Uuid) -> BackendResult<Option<Match>> {
        self.get_optional(&format!("/matches/{}", id)).await
    }

    async fn matches_for_user(&self, user: Uuid) -> BackendResult<Vec<Match>> {
        self.get_json(&format!("/users/{}/matches", user)).await
    }

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<Message> {
        let body = SendMessageRequest {
            content: message.content.clone(),
            client_id: message.client_id,
        };
        self.send_json(Method::POST, &format!("/matches/{}/messages", message.match_id), &body)
            .await
    }

    async fn messages(&self, match_id: Uuid) -> BackendResult<Vec<Message>> {
        self.get_json(&format!("/matches/{}/messages", match_id)).await
    }

    async fn mark_read(&self, match_id: Uuid, _reader: Uuid, _at: DateTime<Utc>) -> BackendResult<usize> {
        let path = format!("/matches/{}/read", match_id);
        let resp: MarkReadResponse = self
            .send(self.request(Method::POST, &path), &path)
            .await?
            .json()
            .await?;
        Ok(resp.updated)
    }

    async fn upsert_typing(&self, match_id: Uuid, _user: Uuid, _at: DateTime<Utc>) -> BackendResult<()> {
        self.send_empty::<()>(Method::PUT, &format!("/matches/{}/typing", match_id), None)
            .await
    }

    async fn delete_typing(&self, match_id: Uuid, _user: Uuid) -> BackendResult<()> {
        self.send_empty::<()>(Method::DELETE, &format!("/matches/{}/typing", match_id), None)
            .await
    }

    async fn typing(&self, match_id: Uuid, user: Uuid) -> BackendResult<Option<TypingIndicator>> {
        self.get_json(&format!("/matches/{}/typing/{}", match_id, user)).await
    }

    async fn insert_invite(&self, invite: &CallInvite) -> BackendResult<CallInvite> {
        self.send_json(Method::POST, "/calls", invite).await
    }

    async fn invite(&self, id: Uuid) -> BackendResult<Option<CallInvite>> {
        self.get_optional(&format!("/calls/{}", id)).await
    }

    async fn ringing_invite_for_match(&self, match_id: Uuid, callee: Uuid) -> BackendResult<Option<CallInvite>> {
        self.get_json(&format!("/users/{}/calls/ringing?match_id={}", callee, match_id))
            .await
    }

    async fn ringing_invite_for_callee(&self, callee: Uuid) -> BackendResult<Option<CallInvite>> {
        self.get_json(&format!("/users/{}/calls/ringing", callee)).await
    }

    async fn update_invite_status(&self, id: Uuid, status: CallStatus) -> BackendResult<()> {
        self.send_empty(
            Method::PATCH,
            &format!("/calls/{}", id),
            Some(&UpdateInviteStatusRequest { status }),
        )
        .await
    }

    async fn profile(&self, user: Uuid) -> BackendResult<Option<Profile>> {
        self.get_optional(&format!("/users/{}", user)).await
    }

    async fn upsert_device_token(&self, user: Uuid, token: &str) -> BackendResult<()> {
        self.send_empty(
            Method::PUT,
            &format!("/users/{}/device-token", user),
            Some(&DeviceTokenRequest {
                token: token.to_string(),
            }),
        )
        .await
    }
}
