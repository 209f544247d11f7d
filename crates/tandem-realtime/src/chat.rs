use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tandem_types::Message;
use tandem_types::events::ChatEvent;

use crate::alerts::AlertCoordinator;
use crate::backend::Backend;
use crate::calls::CallInvites;
use crate::config::RealtimeConfig;
use crate::error::SendError;
use crate::presence::{TypingDebouncer, TypingTracker};
use crate::sync::{Conversation, MessageSync, ReadLabel};

/// Per-tick state of an open conversation's poll loop.
struct Poller {
    me: Uuid,
    other: Uuid,
    conversation: Arc<Mutex<Conversation>>,
    sync: MessageSync,
    tracker: TypingTracker,
    calls: CallInvites,
    alerts: AlertCoordinator,
    ring_timeout: chrono::Duration,
    events: mpsc::UnboundedSender<ChatEvent>,
    other_typing: bool,
    ringing: Option<Uuid>,
}

impl Poller {
    /// One reconcile pass. Returns false once nobody is listening.
    async fn tick(&mut self) -> bool {
        let Some(match_id) = self.conversation.lock().unwrap_or_else(PoisonError::into_inner).match_id() else {
            // No match row until the first message goes out.
            return true;
        };

        let fetched = self.sync.get_messages(match_id).await;
        let (reconciled, peer_unread) = {
            let mut conv = self.conversation.lock().unwrap_or_else(PoisonError::into_inner);
            let reconciled = conv.reconcile(fetched);
            (reconciled, conv.unread_count())
        };

        if !reconciled.appended.is_empty() {
            debug!("{} new message(s) in match {}", reconciled.appended.len(), match_id);
            let messages = reconciled.appended;
            if !self.emit(ChatEvent::MessagesAppended { messages }) {
                return false;
            }
        }
        if reconciled.read_changed && !self.emit(ChatEvent::ReadStateChanged) {
            return false;
        }

        // The conversation is on screen, so anything the peer sent is read.
        // A failed write leaves the rows unread and is retried next tick.
        if peer_unread > 0 {
            match self.sync.mark_messages_as_read(self.me, match_id).await {
                Ok(updated) => {
                    debug!("Marked {} message(s) read in match {}", updated, match_id);
                    self.alerts.set_unread(match_id, 0);
                }
                Err(e) => {
                    warn!("Marking match {} read failed: {}", match_id, e);
                    self.alerts.set_unread(match_id, peer_unread);
                }
            }
        }

        let typing = self.tracker.is_other_typing(match_id, self.other).await;
        if typing != self.other_typing {
            self.other_typing = typing;
            let event = ChatEvent::TypingChanged {
                user_id: self.other,
                typing,
            };
            if !self.emit(event) {
                return false;
            }
        }

        match self.calls.ringing_for_match(match_id, self.me).await {
            Some(invite) if !invite.is_expired_at(Utc::now(), self.ring_timeout) => {
                if self.ringing != Some(invite.id) {
                    self.ringing = Some(invite.id);
                    return self.emit(ChatEvent::CallRinging { invite });
                }
            }
            _ => self.ringing = None,
        }
        true
    }

    fn emit(&self, event: ChatEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// An open conversation screen.
///
/// Opening spawns a loop that re-reads messages, the peer's typing state and
/// any ringing invite for this match every `message_poll_interval`, and
/// publishes the differences as `ChatEvent`s. Closing (or dropping) the room
/// cancels the loop; `close` also clears this user's typing indicator.
pub struct ChatRoom {
    me: Uuid,
    conversation: Arc<Mutex<Conversation>>,
    sync: MessageSync,
    tracker: TypingTracker,
    throttle: Duration,
    idle: Duration,
    debouncer: Mutex<Option<Arc<TypingDebouncer>>>,
    poller: Arc<tokio::sync::Mutex<Poller>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatRoom {
    /// Must run inside a tokio runtime. `match_id` is `None` for a first
    /// contact; the match is created by the first send.
    pub fn open(
        backend: Arc<dyn Backend>,
        config: &RealtimeConfig,
        alerts: AlertCoordinator,
        me: Uuid,
        other: Uuid,
        match_id: Option<Uuid>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let conversation = Arc::new(Mutex::new(Conversation::new(me, other, match_id)));
        let sync = MessageSync::new(backend.clone());
        let tracker = TypingTracker::from_config(backend.clone(), config);

        let poller = Arc::new(tokio::sync::Mutex::new(Poller {
            me,
            other,
            conversation: conversation.clone(),
            sync: sync.clone(),
            tracker: tracker.clone(),
            calls: CallInvites::new(backend, config),
            alerts,
            ring_timeout: config.ring_timeout_chrono(),
            events,
            other_typing: false,
            ringing: None,
        }));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poll_loop(
            poller.clone(),
            config.message_poll_interval,
            cancel.clone(),
        ));
        info!("Opened conversation between {} and {}", me, other);

        let room = Self {
            me,
            conversation,
            sync,
            tracker,
            throttle: config.typing_throttle,
            idle: config.typing_idle,
            debouncer: Mutex::new(None),
            poller,
            cancel,
            task: Some(task),
        };
        (room, rx)
    }

    pub fn match_id(&self) -> Option<Uuid> {
        self.lock().match_id()
    }

    /// A copy of the local list, pending entries included.
    pub fn snapshot(&self) -> Conversation {
        self.lock().clone()
    }

    pub fn read_label(&self) -> ReadLabel {
        self.lock().read_label()
    }

    /// Optimistic send. On failure the entry is already gone from the list
    /// and the error is for the user to see and retry.
    pub async fn send(&self, content: &str) -> Result<Message, SendError> {
        let message = self.sync.send_optimistic(&self.conversation, content).await?;
        if let Some(debouncer) = self.debouncer() {
            debouncer.stop().await;
        }
        Ok(message)
    }

    /// Keystroke hook for the input field.
    pub async fn on_input_changed(&self, text: &str) {
        if let Some(debouncer) = self.debouncer() {
            debouncer.on_input_changed(text).await;
        }
    }

    /// Runs one reconcile pass now instead of waiting for the next tick.
    pub async fn refresh(&self) {
        self.poller.lock().await.tick().await;
    }

    /// Stops polling and clears this user's typing indicator.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Chat poll task ended abnormally: {}", e);
            }
        }
        let debouncer = self.debouncer.lock().unwrap_or_else(PoisonError::into_inner).take();
        match (debouncer, self.match_id()) {
            (Some(debouncer), _) => debouncer.stop().await,
            (None, Some(match_id)) => {
                if let Err(e) = self.tracker.clear_typing(match_id, self.me).await {
                    debug!("Clearing typing on close of match {} failed: {}", match_id, e);
                }
            }
            (None, None) => {}
        }
        info!("Closed conversation {:?}", self.match_id());
    }

    /// The debouncer needs a match id, so it is created on first use once
    /// the match exists.
    fn debouncer(&self) -> Option<Arc<TypingDebouncer>> {
        let match_id = self.match_id()?;
        let mut slot = self.debouncer.lock().unwrap_or_else(PoisonError::into_inner);
        let debouncer = slot.get_or_insert_with(|| {
            Arc::new(TypingDebouncer::new(
                self.tracker.clone(),
                match_id,
                self.me,
                self.throttle,
                self.idle,
            ))
        });
        Some(debouncer.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop(
    poller: Arc<tokio::sync::Mutex<Poller>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let open = tokio::select! {
                    _ = cancel.cancelled() => break,
                    open = async { poller.lock().await.tick().await } => open,
                };
                if !open {
                    debug!("Chat event receiver dropped, stopping poll loop");
                    break;
                }
            }
        }
    }
}
