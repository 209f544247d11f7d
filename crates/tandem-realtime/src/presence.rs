use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::config::RealtimeConfig;
use crate::error::BackendError;

/// Self-expiring typing signal stored as one row per (match, user).
///
/// A row only counts while it is younger than the TTL, so a client that dies
/// mid-sentence stops showing as typing without sending anything.
#[derive(Clone)]
pub struct TypingTracker {
    backend: Arc<dyn Backend>,
    ttl: chrono::Duration,
}

impl TypingTracker {
    pub fn new(backend: Arc<dyn Backend>, ttl: chrono::Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &RealtimeConfig) -> Self {
        Self::new(backend, config.typing_ttl_chrono())
    }

    pub async fn set_typing(&self, match_id: Uuid, user_id: Uuid) -> Result<(), BackendError> {
        self.backend.upsert_typing(match_id, user_id, Utc::now()).await
    }

    pub async fn clear_typing(&self, match_id: Uuid, user_id: Uuid) -> Result<(), BackendError> {
        self.backend.delete_typing(match_id, user_id).await
    }

    pub async fn is_other_typing(&self, match_id: Uuid, other_id: Uuid) -> bool {
        self.is_other_typing_at(match_id, other_id, Utc::now()).await
    }

    /// Read failures report "not typing".
    pub async fn is_other_typing_at(&self, match_id: Uuid, other_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.backend.typing(match_id, other_id).await {
            Ok(Some(indicator)) => indicator.is_live_at(now, self.ttl),
            Ok(None) => false,
            Err(e) => {
                debug!("Typing read for match {} failed: {}", match_id, e);
                false
            }
        }
    }
}

#[derive(Default)]
struct DebounceState {
    last_sent: Option<Instant>,
    idle_timer: Option<JoinHandle<()>>,
}

/// Client-side keystroke debouncer for one conversation.
///
/// Keystrokes upsert the indicator at most once per throttle window. The
/// indicator is cleared when the input becomes empty, when `stop` is called
/// (screen left), or after the idle delay passes with no further keystroke.
pub struct TypingDebouncer {
    tracker: TypingTracker,
    match_id: Uuid,
    user_id: Uuid,
    throttle: Duration,
    idle: Duration,
    state: Arc<Mutex<DebounceState>>,
}

impl TypingDebouncer {
    pub fn new(
        tracker: TypingTracker,
        match_id: Uuid,
        user_id: Uuid,
        throttle: Duration,
        idle: Duration,
    ) -> Self {
        Self {
            tracker,
            match_id,
            user_id,
            throttle,
            idle,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    pub async fn on_input_changed(&self, text: &str) {
        if text.trim().is_empty() {
            self.stop().await;
            return;
        }

        let due = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let due = state
                .last_sent
                .is_none_or(|sent| sent.elapsed() >= self.throttle);
            if due {
                state.last_sent = Some(Instant::now());
            }
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
            state.idle_timer = Some(self.spawn_idle_timer());
            due
        };

        if due {
            if let Err(e) = self.tracker.set_typing(self.match_id, self.user_id).await {
                warn!("Failed to publish typing for match {}: {}", self.match_id, e);
            }
        }
    }

    /// Clears the indicator now and cancels the idle timer.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.last_sent = None;
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
        }
        if let Err(e) = self.tracker.clear_typing(self.match_id, self.user_id).await {
            warn!("Failed to clear typing for match {}: {}", self.match_id, e);
        }
    }

    fn spawn_idle_timer(&self) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        let state = self.state.clone();
        let (match_id, user_id, idle) = (self.match_id, self.user_id, self.idle);
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            state.lock().unwrap_or_else(PoisonError::into_inner).last_sent = None;
            if let Err(e) = tracker.clear_typing(match_id, user_id).await {
                debug!("Idle typing clear for match {} failed: {}", match_id, e);
            }
        })
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
        }
    }
}
