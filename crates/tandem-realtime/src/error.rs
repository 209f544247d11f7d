use thiserror::Error;
use uuid::Uuid;

use tandem_types::models::{CallAction, CallStatus};

/// A backend read or write failed.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {path}")]
    Status { status: u16, path: String },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("a user cannot like, pass or block themselves")]
    SelfInteraction,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failure of a user-initiated send. The optimistic entry has already been
/// rolled back when this is returned.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    Empty,

    #[error("message is longer than {max} characters")]
    TooLong { max: usize },

    #[error("a user cannot message themselves")]
    SelfInteraction,

    #[error("one of the users has blocked the other")]
    Blocked,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcError {
    /// Raised by `setup`, before any engine call is made.
    #[error("RTC application credential is not configured")]
    MissingCredential,

    #[error("RTC engine returned error code {0}")]
    Engine(i32),

    #[error("RTC engine is not initialized")]
    NotInitialized,
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("cannot {action:?} a call that is {from:?}")]
    InvalidTransition { from: CallStatus, action: CallAction },

    #[error("user {0} is not a participant of this call")]
    NotParticipant(Uuid),

    #[error("a user cannot call themselves")]
    SelfCall,

    #[error("no incoming call is being presented")]
    NoIncomingCall,

    #[error(transparent)]
    Rtc(#[from] RtcError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no user is signed in")]
    NotSignedIn,

    #[error(transparent)]
    Backend(#[from] BackendError),
}
