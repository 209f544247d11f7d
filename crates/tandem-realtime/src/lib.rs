//! Real-time interaction layer: match resolution, typing presence, message
//! synchronization and call signaling over a plain row store.
//!
//! Everything here is driven by polling. Screen-scoped loops (`ChatRoom`)
//! and the session-scoped `CallWatcher` re-read backend rows on a fixed
//! interval and publish what changed as events, so callers never depend on
//! whether the transport underneath is polled or pushed.

pub mod alerts;
pub mod backend;
pub mod calls;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod local;
pub mod presence;
pub mod resolver;
pub mod rtc;
pub mod session;
pub mod sync;
pub mod watcher;

pub use alerts::{Alert, AlertCoordinator, AlertSink, NullAlertSink, TracingAlertSink};
pub use backend::Backend;
pub use calls::CallInvites;
pub use chat::ChatRoom;
pub use config::RealtimeConfig;
pub use error::{BackendError, CallError, ResolveError, RtcError, SendError, SessionError};
pub use http::HttpBackend;
pub use local::LocalBackend;
pub use presence::{TypingDebouncer, TypingTracker};
pub use resolver::{LikeOutcome, MatchResolver};
pub use rtc::{CallSession, RtcEngine, RtcEngineFactory, SessionState};
pub use session::UserSession;
pub use sync::{Conversation, MessageSync, ReadLabel};
pub use watcher::CallWatcher;
