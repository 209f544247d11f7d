//! Database row types. These map directly to SQLite rows and are converted
//! into `tandem-types` models with `into_model`, which is where stored text is
//! validated.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tandem_types::{CallInvite, Match, Message, Profile, TypingIndicator};

/// Stored timestamp format: RFC 3339, UTC, microsecond precision. Fixed width,
/// so text ordering is chronological ordering.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses either the stored RFC 3339 form or SQLite's `datetime('now')` form.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("invalid timestamp '{}'", raw))
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .with_context(|| format!("invalid {} '{}'", column, raw))
}

pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn into_model(self) -> Result<Profile> {
        Ok(Profile {
            id: parse_uuid(&self.id, "users.id")?,
            display_name: self.display_name,
            photo_url: self.photo_url,
        })
    }
}

pub struct MatchRow {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: String,
}

impl MatchRow {
    pub fn into_model(self) -> Result<Match> {
        Ok(Match {
            id: parse_uuid(&self.id, "matches.id")?,
            user1_id: parse_uuid(&self.user1_id, "matches.user1_id")?,
            user2_id: parse_uuid(&self.user2_id, "matches.user2_id")?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub content: String,
    pub client_id: Option<String>,
    pub created_at: String,
    pub read_at: Option<String>,
}

impl MessageRow {
    pub fn into_model(self) -> Result<Message> {
        Ok(Message {
            id: parse_uuid(&self.id, "messages.id")?,
            match_id: parse_uuid(&self.match_id, "messages.match_id")?,
            sender_id: parse_uuid(&self.sender_id, "messages.sender_id")?,
            content: self.content,
            client_id: self
                .client_id
                .as_deref()
                .map(|raw| parse_uuid(raw, "messages.client_id"))
                .transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            read_at: self.read_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

pub struct TypingRow {
    pub match_id: String,
    pub user_id: String,
    pub updated_at: String,
}

impl TypingRow {
    pub fn into_model(self) -> Result<TypingIndicator> {
        Ok(TypingIndicator {
            match_id: parse_uuid(&self.match_id, "typing_indicators.match_id")?,
            user_id: parse_uuid(&self.user_id, "typing_indicators.user_id")?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub struct CallInviteRow {
    pub id: String,
    pub match_id: String,
    pub caller_id: String,
    pub callee_id: String,
    pub channel_name: String,
    pub call_type: String,
    pub status: String,
    pub created_at: String,
}

impl CallInviteRow {
    pub fn from_model(invite: &CallInvite) -> Self {
        Self {
            id: invite.id.to_string(),
            match_id: invite.match_id.to_string(),
            caller_id: invite.caller_id.to_string(),
            callee_id: invite.callee_id.to_string(),
            channel_name: invite.channel_name.clone(),
            call_type: invite.call_type.as_str().to_string(),
            status: invite.status.as_str().to_string(),
            created_at: format_timestamp(invite.created_at),
        }
    }

    pub fn into_model(self) -> Result<CallInvite> {
        Ok(CallInvite {
            id: parse_uuid(&self.id, "call_invites.id")?,
            match_id: parse_uuid(&self.match_id, "call_invites.match_id")?,
            caller_id: parse_uuid(&self.caller_id, "call_invites.caller_id")?,
            callee_id: parse_uuid(&self.callee_id, "call_invites.callee_id")?,
            channel_name: self.channel_name,
            call_type: self.call_type.parse()?,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
