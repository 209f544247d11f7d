use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directional "like" from one user to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An unordered pair of users stored as `(lo, hi)`.
///
/// `Uuid` orders by its bytes, which is the same order as its lowercase
/// hyphenated text form, so `lo < hi` also holds for the TEXT columns in the
/// `matches` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalPair {
    lo: Uuid,
    hi: Uuid,
}

impl CanonicalPair {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn lo(&self) -> Uuid {
        self.lo
    }

    pub fn hi(&self) -> Uuid {
        self.hi
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.lo == user_id || self.hi == user_id
    }

    /// Both ids are the same user.
    pub fn is_degenerate(&self) -> bool {
        self.lo == self.hi
    }
}

/// A mutual pairing. `user1_id < user2_id` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn pair(&self) -> CanonicalPair {
        CanonicalPair::new(self.user1_id, self.user2_id)
    }

    /// The participant that is not `me`, or `None` if `me` is not in this match.
    pub fn other_user(&self, me: Uuid) -> Option<Uuid> {
        if me == self.user1_id {
            Some(self.user2_id)
        } else if me == self.user2_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    /// Correlation id generated by the sending client, used to pair an
    /// optimistic local entry with its persisted row.
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Longest message body accepted, in characters, after trimming.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Insert payload for a message row; id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl TypingIndicator {
    /// Live while `now - updated_at < ttl`.
    pub fn is_live_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.updated_at) < ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Voice,
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
    Missed,
    Declined,
    Ended,
}

/// Local actions that move a call invite out of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    Answer,
    Decline,
    Expire,
    HangUp,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Missed => "missed",
            Self::Declined => "declined",
            Self::Ended => "ended",
        }
    }

    /// Next status for `action`, or `None` if the action is not valid here.
    ///
    /// Declines are recorded as `Missed`; `Declined` is only ever read back
    /// from rows written by other clients.
    pub fn apply(self, action: CallAction) -> Option<CallStatus> {
        match (self, action) {
            (Self::Ringing, CallAction::Answer) => Some(Self::Active),
            (Self::Ringing, CallAction::Decline) => Some(Self::Missed),
            (Self::Ringing, CallAction::Expire) => Some(Self::Missed),
            (Self::Ringing, CallAction::HangUp) => Some(Self::Ended),
            (Self::Active, CallAction::HangUp) => Some(Self::Ended),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Missed | Self::Declined | Self::Ended)
    }
}

/// Returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for CallType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for CallStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ringing" => Ok(Self::Ringing),
            "active" => Ok(Self::Active),
            "missed" => Ok(Self::Missed),
            "declined" => Ok(Self::Declined),
            "ended" => Ok(Self::Ended),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInvite {
    pub id: Uuid,
    pub match_id: Uuid,
    pub caller_id: Uuid,
    pub callee_id: Uuid,
    pub channel_name: String,
    pub call_type: CallType,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

impl CallInvite {
    pub fn is_expired_at(&self, now: DateTime<Utc>, ring_timeout: Duration) -> bool {
        now.signed_duration_since(self.created_at) >= ring_timeout
    }
}

/// The slice of a user's profile shown on an incoming call prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub user_id: Uuid,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = CanonicalPair::new(a, b);
        let ba = CanonicalPair::new(b, a);
        assert_eq!(ab, ba);
        assert!(ab.lo() < ab.hi());
        assert!(ab.lo().to_string() < ab.hi().to_string());
    }

    #[test]
    fn match_other_user() {
        let pair = CanonicalPair::new(Uuid::new_v4(), Uuid::new_v4());
        let m = Match {
            id: Uuid::new_v4(),
            user1_id: pair.lo(),
            user2_id: pair.hi(),
            created_at: Utc::now(),
        };
        assert_eq!(m.other_user(pair.lo()), Some(pair.hi()));
        assert_eq!(m.other_user(pair.hi()), Some(pair.lo()));
        assert_eq!(m.other_user(Uuid::new_v4()), None);
    }

    #[test]
    fn typing_ttl_boundary() {
        let now = Utc::now();
        let ttl = Duration::seconds(3);
        let indicator = |age_ms: i64| TypingIndicator {
            match_id: Uuid::nil(),
            user_id: Uuid::nil(),
            updated_at: now - Duration::milliseconds(age_ms),
        };
        assert!(indicator(0).is_live_at(now, ttl));
        assert!(indicator(2_999).is_live_at(now, ttl));
        assert!(!indicator(3_000).is_live_at(now, ttl));
        assert!(!indicator(3_100).is_live_at(now, ttl));
    }

    #[test]
    fn call_status_transitions() {
        use CallAction::*;
        assert_eq!(CallStatus::Ringing.apply(Answer), Some(CallStatus::Active));
        assert_eq!(CallStatus::Ringing.apply(Decline), Some(CallStatus::Missed));
        assert_eq!(CallStatus::Ringing.apply(Expire), Some(CallStatus::Missed));
        assert_eq!(CallStatus::Active.apply(HangUp), Some(CallStatus::Ended));
        assert_eq!(CallStatus::Active.apply(Answer), None);
        assert_eq!(CallStatus::Missed.apply(Answer), None);
        assert_eq!(CallStatus::Ended.apply(HangUp), None);
    }

    #[test]
    fn enum_text_forms() {
        for status in [
            CallStatus::Ringing,
            CallStatus::Active,
            CallStatus::Missed,
            CallStatus::Declined,
            CallStatus::Ended,
        ] {
            assert_eq!(status.as_str().parse::<CallStatus>(), Ok(status));
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert!("busy".parse::<CallStatus>().is_err());
        assert_eq!("video".parse::<CallType>(), Ok(CallType::Video));
    }
}
