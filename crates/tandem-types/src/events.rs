use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CallInvite, CallStatus, CallType, Message, Profile};

/// Events emitted by an open conversation, whatever the transport behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Persisted messages that were not in the local list before.
    MessagesAppended { messages: Vec<Message> },

    /// One or more `read_at` values changed.
    ReadStateChanged,

    /// The other participant started or stopped typing.
    TypingChanged { user_id: Uuid, typing: bool },

    /// The peer is calling from this conversation.
    CallRinging { invite: CallInvite },
}

/// A ringing invite addressed to the current user, with the caller's profile
/// when it could be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub invite: CallInvite,
    pub caller: Option<Profile>,
}

impl IncomingCall {
    pub fn caller_name(&self) -> &str {
        self.caller
            .as_ref()
            .map(|p| p.display_name.as_str())
            .unwrap_or("Someone")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CallEvent {
    /// A new incoming call should be presented.
    Incoming(IncomingCall),

    /// The presented call is gone: answered, declined, expired or cancelled.
    Dismissed { invite_id: Uuid, status: CallStatus },
}

/// Connection state reported by the RTC engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// The fixed set of callbacks an RTC engine delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcEvent {
    Joined { channel: String, uid: u32 },
    PeerJoined { uid: u32 },
    PeerLeft { uid: u32 },
    ConnectionStateChanged(ConnectionState),
}

/// Payload handed to the push-delivery collaborator when a message or a
/// ringing invite row is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub token: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_type: Option<CallType>,
}

impl PushPayload {
    pub fn for_message(token: String, sender_name: &str, message: &Message) -> Self {
        Self {
            token,
            title: sender_name.to_string(),
            body: message.content.clone(),
            invite_id: None,
            message_id: Some(message.id),
            channel_name: None,
            caller_id: None,
            call_type: None,
        }
    }

    pub fn for_invite(token: String, caller_name: &str, invite: &CallInvite) -> Self {
        let kind = if invite.call_type.is_video() { "video" } else { "voice" };
        Self {
            token,
            title: caller_name.to_string(),
            body: format!("Incoming {} call", kind),
            invite_id: Some(invite.id),
            message_id: None,
            channel_name: Some(invite.channel_name.clone()),
            caller_id: Some(invite.caller_id),
            call_type: Some(invite.call_type),
        }
    }
}
