use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

pub use tandem_types::models::MAX_MESSAGE_LEN;
use tandem_types::{CanonicalPair, Match, Message, NewMessage};

use crate::backend::Backend;
use crate::error::{BackendError, SendError};

/// A message shown locally before the backend confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub client_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One line of the rendered conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<'a> {
    Persisted(&'a Message),
    Pending(&'a PendingMessage),
}

/// What the current user sees under their last sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLabel {
    /// Nothing sent yet.
    None,
    /// Optimistic entry awaiting the backend.
    Sending,
    Sent,
    /// Read, and the peer has written since.
    Read,
    /// Read, and it is still the last message in the conversation.
    LeftOnRead,
}

/// Result of merging a fetched page into the local list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub appended: Vec<Message>,
    pub read_changed: bool,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty() && !self.read_changed
    }
}

/// Local, ordered view of one conversation: persisted rows plus optimistic
/// entries not yet confirmed.
#[derive(Debug, Clone)]
pub struct Conversation {
    me: Uuid,
    other: Uuid,
    match_id: Option<Uuid>,
    messages: Vec<Message>,
    pending: Vec<PendingMessage>,
}

impl Conversation {
    pub fn new(me: Uuid, other: Uuid, match_id: Option<Uuid>) -> Self {
        Self {
            me,
            other,
            match_id,
            messages: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn me(&self) -> Uuid {
        self.me
    }

    pub fn other(&self) -> Uuid {
        self.other
    }

    pub fn match_id(&self) -> Option<Uuid> {
        self.match_id
    }

    pub fn set_match_id(&mut self, match_id: Uuid) {
        self.match_id = Some(match_id);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Persisted messages followed by pending ones, each group in order.
    pub fn entries(&self) -> Vec<Entry<'_>> {
        self.messages
            .iter()
            .map(Entry::Persisted)
            .chain(self.pending.iter().map(Entry::Pending))
            .collect()
    }

    pub fn push_pending(&mut self, content: &str) -> Uuid {
        let client_id = Uuid::new_v4();
        self.pending.push(PendingMessage {
            client_id,
            sender_id: self.me,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        client_id
    }

    /// Drops an optimistic entry whose send failed.
    pub fn rollback(&mut self, client_id: Uuid) -> Option<PendingMessage> {
        let idx = self.pending.iter().position(|p| p.client_id == client_id)?;
        Some(self.pending.remove(idx))
    }

    /// Replaces the optimistic entry with its persisted row.
    pub fn confirm(&mut self, message: Message) {
        if let Some(client_id) = message.client_id {
            self.pending.retain(|p| p.client_id != client_id);
        }
        self.match_id.get_or_insert(message.match_id);
        self.merge_one(message);
    }

    /// Merges a fetched, oldest-first page. Rows are never deleted upstream,
    /// so rows missing from a stale page are kept rather than dropped.
    pub fn reconcile(&mut self, fetched: Vec<Message>) -> Reconciled {
        let mut result = Reconciled::default();
        let known: HashSet<Uuid> = self.messages.iter().map(|m| m.id).collect();
        let confirmed: HashSet<Uuid> = fetched.iter().filter_map(|m| m.client_id).collect();

        for message in fetched {
            if known.contains(&message.id) {
                if let Some(local) = self.messages.iter_mut().find(|m| m.id == message.id) {
                    if local.read_at != message.read_at {
                        local.read_at = message.read_at;
                        result.read_changed = true;
                    }
                }
            } else {
                self.messages.push(message.clone());
                result.appended.push(message);
            }
        }

        if !result.appended.is_empty() {
            // Stable: equal timestamps keep arrival order.
            self.messages.sort_by_key(|m| m.created_at);
        }
        self.pending.retain(|p| !confirmed.contains(&p.client_id));
        result
    }

    fn merge_one(&mut self, message: Message) {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(local) => local.read_at = message.read_at,
            None => {
                self.messages.push(message);
                self.messages.sort_by_key(|m| m.created_at);
            }
        }
    }

    /// Peer messages not yet read.
    pub fn unread_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id != self.me && m.read_at.is_none())
            .count()
    }

    /// Label for the current user's last sent message.
    ///
    /// "Left on read" applies only when that message is read and nothing
    /// follows it; once the peer replies it becomes "Read".
    pub fn read_label(&self) -> ReadLabel {
        if self.pending.iter().any(|p| p.sender_id == self.me) {
            return ReadLabel::Sending;
        }
        let Some(pos) = self.messages.iter().rposition(|m| m.sender_id == self.me) else {
            return ReadLabel::None;
        };
        let last_own = &self.messages[pos];
        if last_own.read_at.is_none() {
            return ReadLabel::Sent;
        }
        let peer_replied = self.messages[pos + 1..]
            .iter()
            .any(|m| m.sender_id != self.me);
        if peer_replied {
            ReadLabel::Read
        } else {
            ReadLabel::LeftOnRead
        }
    }
}

/// Sends, fetches and marks messages against the backend.
#[derive(Clone)]
pub struct MessageSync {
    backend: Arc<dyn Backend>,
}

impl MessageSync {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Trims and checks message content before anything is written.
    pub fn validate(content: &str) -> Result<String, SendError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SendError::Empty);
        }
        if trimmed.chars().count() > MAX_MESSAGE_LEN {
            return Err(SendError::TooLong {
                max: MAX_MESSAGE_LEN,
            });
        }
        Ok(trimmed.to_string())
    }

    /// Finds or creates the match row for the pair.
    ///
    /// A prior mutual like is not required: the first message between two
    /// users who are not blocked creates the match.
    pub async fn resolve_match(&self, me: Uuid, other: Uuid) -> Result<Match, SendError> {
        if me == other {
            return Err(SendError::SelfInteraction);
        }
        if self.backend.is_blocked(me, other).await? {
            return Err(SendError::Blocked);
        }
        Ok(self.backend.upsert_match(CanonicalPair::new(me, other)).await?)
    }

    /// Resolves the match and inserts the message row. No local state.
    pub async fn send_message(
        &self,
        me: Uuid,
        other: Uuid,
        content: &str,
        client_id: Option<Uuid>,
    ) -> Result<Message, SendError> {
        let content = Self::validate(content)?;
        let matched = self.resolve_match(me, other).await?;
        let message = self
            .backend
            .insert_message(&NewMessage {
                match_id: matched.id,
                sender_id: me,
                content,
                client_id,
            })
            .await?;
        Ok(message)
    }

    /// Optimistic send: the entry is visible in `conversation` immediately and
    /// is either confirmed or rolled back before this returns.
    pub async fn send_optimistic(
        &self,
        conversation: &Mutex<Conversation>,
        content: &str,
    ) -> Result<Message, SendError> {
        let content = Self::validate(content)?;
        let (me, other, client_id) = {
            let mut conv = conversation.lock().unwrap_or_else(PoisonError::into_inner);
            let client_id = conv.push_pending(&content);
            (conv.me(), conv.other(), client_id)
        };

        match self.send_message(me, other, &content, Some(client_id)).await {
            Ok(message) => {
                conversation
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .confirm(message.clone());
                Ok(message)
            }
            Err(e) => {
                error!("Send from {} to {} failed, rolling back: {}", me, other, e);
                conversation
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .rollback(client_id);
                Err(e)
            }
        }
    }

    /// Read failures degrade to an empty list.
    pub async fn get_messages(&self, match_id: Uuid) -> Vec<Message> {
        match self.backend.messages(match_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Fetching messages for match {} failed: {}", match_id, e);
                Vec::new()
            }
        }
    }

    /// Marks every peer message in the match as read by `user`.
    pub async fn mark_messages_as_read(&self, user: Uuid, match_id: Uuid) -> Result<usize, BackendError> {
        self.backend.mark_read(match_id, user, Utc::now()).await
    }
}
