use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use tandem_types::events::{CallEvent, ChatEvent};

use crate::alerts::AlertCoordinator;
use crate::backend::Backend;
use crate::calls::CallInvites;
use crate::chat::ChatRoom;
use crate::config::RealtimeConfig;
use crate::error::SessionError;
use crate::resolver::MatchResolver;
use crate::sync::MessageSync;
use crate::watcher::CallWatcher;

/// Scope of one authenticated user.
///
/// Owns the global call watcher. Signing in as someone else stops the
/// previous watcher before the new one starts, so no loop ever polls on
/// behalf of a user who is no longer signed in.
pub struct UserSession {
    backend: Arc<dyn Backend>,
    config: RealtimeConfig,
    alerts: AlertCoordinator,
    watcher: Option<CallWatcher>,
}

impl UserSession {
    pub fn new(backend: Arc<dyn Backend>, config: RealtimeConfig, alerts: AlertCoordinator) -> Self {
        Self {
            backend,
            config,
            alerts,
            watcher: None,
        }
    }

    /// Starts the call watcher for `user_id`. Must run inside a tokio runtime.
    pub fn sign_in(&mut self, user_id: Uuid) -> mpsc::UnboundedReceiver<CallEvent> {
        self.sign_out();
        let (watcher, events) = CallWatcher::start(
            self.backend.clone(),
            &self.config,
            self.alerts.clone(),
            user_id,
        );
        self.watcher = Some(watcher);
        info!("{} signed in", user_id);
        events
    }

    /// Stops the watcher and silences ringing and badges. No-op when nobody
    /// is signed in.
    pub fn sign_out(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
            self.alerts.reset();
            info!("{} signed out", watcher.user_id());
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.watcher.as_ref().map(CallWatcher::user_id)
    }

    pub fn watcher(&self) -> Option<&CallWatcher> {
        self.watcher.as_ref()
    }

    pub fn alerts(&self) -> &AlertCoordinator {
        &self.alerts
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn resolver(&self) -> MatchResolver {
        MatchResolver::new(self.backend.clone())
    }

    pub fn messages(&self) -> MessageSync {
        MessageSync::new(self.backend.clone())
    }

    pub fn calls(&self) -> CallInvites {
        CallInvites::new(self.backend.clone(), &self.config)
    }

    /// Opens a conversation with `other` as the signed-in user.
    pub fn open_chat(
        &self,
        other: Uuid,
        match_id: Option<Uuid>,
    ) -> Result<(ChatRoom, mpsc::UnboundedReceiver<ChatEvent>), SessionError> {
        let me = self.user_id().ok_or(SessionError::NotSignedIn)?;
        Ok(ChatRoom::open(
            self.backend.clone(),
            &self.config,
            self.alerts.clone(),
            me,
            other,
            match_id,
        ))
    }

    /// Stores the push token for the signed-in user, replacing any previous
    /// one.
    pub async fn register_device_token(&self, token: &str) -> Result<(), SessionError> {
        let user_id = self.user_id().ok_or(SessionError::NotSignedIn)?;
        self.backend.upsert_device_token(user_id, token).await?;
        info!("Registered device token for {}", user_id);
        Ok(())
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }
}
