pub mod api;
pub mod events;
pub mod models;

pub use models::{
    CallInvite, CallStatus, CallType, CanonicalPair, DeviceToken, Like, Match, Message,
    NewMessage, Profile, TypingIndicator,
};
