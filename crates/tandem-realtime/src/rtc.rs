use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tandem_types::events::{ConnectionState, RtcEvent};

use crate::error::RtcError;

/// Camera capture settings applied before a video join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            frame_rate: 15,
        }
    }
}

/// Media options passed with a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    pub publish_microphone: bool,
    pub publish_camera: bool,
    pub subscribe_audio: bool,
    pub subscribe_video: bool,
}

impl JoinOptions {
    pub fn for_call(video: bool) -> Self {
        Self {
            publish_microphone: true,
            publish_camera: video,
            subscribe_audio: true,
            subscribe_video: video,
        }
    }
}

/// The external audio/video transport. Calls return engine status codes where
/// the engine reports them; zero means success.
pub trait RtcEngine: Send {
    /// `None` configures an audio-only session.
    fn configure_video(&mut self, profile: Option<VideoProfile>);

    fn join_channel(&mut self, channel: &str, uid: u32, options: &JoinOptions) -> i32;

    fn leave_channel(&mut self) -> i32;

    fn mute_local_audio(&mut self, muted: bool);

    fn mute_local_video(&mut self, muted: bool);

    fn switch_camera(&mut self);

    /// Destroys the engine instance.
    fn release(self: Box<Self>);
}

/// Creates engine instances. Engines report callbacks on `events`.
pub trait RtcEngineFactory: Send + Sync {
    fn create(
        &self,
        app_id: &str,
        events: mpsc::UnboundedSender<RtcEvent>,
    ) -> Result<Box<dyn RtcEngine>, RtcError>;
}

/// Observable call state for the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub channel: Option<String>,
    pub local_uid: Option<u32>,
    pub remote_uid: Option<u32>,
    pub muted: bool,
    pub video_enabled: bool,
}

/// Numeric RTC identity for a user. Never zero, since zero asks the engine to
/// pick one.
pub fn rtc_uid(user_id: Uuid) -> u32 {
    let bytes = user_id.as_bytes();
    let folded = bytes
        .chunks(4)
        .fold(0u32, |acc, chunk| {
            acc ^ u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
        });
    if folded == 0 { 1 } else { folded }
}

/// Owns one RTC engine through `setup -> join -> leave`.
///
/// The session is passed by `&mut` to whoever drives the call, so there is
/// exactly one writer. `leave` destroys the engine; the next call runs
/// `setup` again (which `join` does implicitly).
pub struct CallSession {
    factory: Arc<dyn RtcEngineFactory>,
    app_id: Option<String>,
    engine: Option<Box<dyn RtcEngine>>,
    events_task: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl CallSession {
    pub fn new(factory: Arc<dyn RtcEngineFactory>, app_id: Option<String>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            factory,
            app_id,
            engine: None,
            events_task: None,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Creates the engine unless one exists. Must run inside a tokio runtime.
    pub fn setup(&mut self) -> Result<(), RtcError> {
        if self.engine.is_some() {
            return Ok(());
        }
        let app_id = self
            .app_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(RtcError::MissingCredential)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = self.factory.create(app_id, events_tx)?;
        self.events_task = Some(tokio::spawn(pump_events(events_rx, self.state.clone())));
        self.engine = Some(engine);
        debug!("RTC engine created");
        Ok(())
    }

    pub fn join(&mut self, channel: &str, uid: u32, video: bool) -> Result<(), RtcError> {
        self.setup()?;
        let engine = self.engine.as_mut().ok_or(RtcError::NotInitialized)?;

        engine.configure_video(video.then(VideoProfile::default));
        self.state.send_modify(|s| {
            s.connection = ConnectionState::Connecting;
            s.channel = Some(channel.to_string());
            s.video_enabled = video;
            s.muted = false;
        });

        let code = engine.join_channel(channel, uid, &JoinOptions::for_call(video));
        if code != 0 {
            warn!("RTC join of {} failed with code {}", channel, code);
            self.state.send_modify(|s| s.connection = ConnectionState::Failed);
            return Err(RtcError::Engine(code));
        }
        info!("Joining RTC channel {} as {}", channel, uid);
        Ok(())
    }

    /// Leaves the channel and destroys the engine.
    pub fn leave(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            let code = engine.leave_channel();
            if code != 0 {
                debug!("RTC leave returned code {}", code);
            }
            engine.release();
            info!("RTC engine released");
        }
        if let Some(task) = self.events_task.take() {
            task.abort();
        }
        self.state.send_replace(SessionState::default());
    }

    pub fn toggle_mute(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let muted = !self.state.borrow().muted;
        engine.mute_local_audio(muted);
        self.state.send_modify(|s| s.muted = muted);
    }

    pub fn toggle_video(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let enabled = !self.state.borrow().video_enabled;
        engine.mute_local_video(!enabled);
        self.state.send_modify(|s| s.video_enabled = enabled);
    }

    pub fn switch_camera(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.switch_camera();
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.leave();
    }
}

async fn pump_events(mut events: mpsc::UnboundedReceiver<RtcEvent>, state: Arc<watch::Sender<SessionState>>) {
    while let Some(event) = events.recv().await {
        debug!("RTC event: {:?}", event);
        state.send_modify(|s| match event {
            RtcEvent::Joined { channel, uid } => {
                s.connection = ConnectionState::Connected;
                s.channel = Some(channel);
                s.local_uid = Some(uid);
            }
            RtcEvent::PeerJoined { uid } => s.remote_uid = Some(uid),
            RtcEvent::PeerLeft { uid } => {
                if s.remote_uid == Some(uid) {
                    s.remote_uid = None;
                }
            }
            RtcEvent::ConnectionStateChanged(connection) => s.connection = connection,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Log {
        calls: Mutex<Vec<String>>,
        events: Mutex<Option<mpsc::UnboundedSender<RtcEvent>>>,
    }

    impl Log {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn emit(&self, event: RtcEvent) {
            let events = self.events.lock().unwrap();
            events.as_ref().unwrap().send(event).unwrap();
        }
    }

    struct FakeEngine {
        log: Arc<Log>,
        join_code: i32,
    }

    impl RtcEngine for FakeEngine {
        fn configure_video(&mut self, profile: Option<VideoProfile>) {
            self.log.calls.lock().unwrap().push(format!("video:{}", profile.is_some()));
        }
        fn join_channel(&mut self, channel: &str, _uid: u32, _options: &JoinOptions) -> i32 {
            self.log.calls.lock().unwrap().push(format!("join:{}", channel));
            self.join_code
        }
        fn leave_channel(&mut self) -> i32 {
            self.log.calls.lock().unwrap().push("leave".into());
            0
        }
        fn mute_local_audio(&mut self, muted: bool) {
            self.log.calls.lock().unwrap().push(format!("mute:{}", muted));
        }
        fn mute_local_video(&mut self, muted: bool) {
            self.log.calls.lock().unwrap().push(format!("mute_video:{}", muted));
        }
        fn switch_camera(&mut self) {
            self.log.calls.lock().unwrap().push("switch".into());
        }
        fn release(self: Box<Self>) {
            self.log.calls.lock().unwrap().push("release".into());
        }
    }

    struct FakeFactory {
        log: Arc<Log>,
        join_code: i32,
    }

    impl RtcEngineFactory for FakeFactory {
        fn create(
            &self,
            app_id: &str,
            events: mpsc::UnboundedSender<RtcEvent>,
        ) -> Result<Box<dyn RtcEngine>, RtcError> {
            self.log.calls.lock().unwrap().push(format!("create:{}", app_id));
            *self.log.events.lock().unwrap() = Some(events);
            Ok(Box::new(FakeEngine {
                log: self.log.clone(),
                join_code: self.join_code,
            }))
        }
    }

    fn session(join_code: i32, app_id: Option<&str>) -> (CallSession, Arc<Log>) {
        let log = Arc::new(Log::default());
        let factory = Arc::new(FakeFactory {
            log: log.clone(),
            join_code,
        });
        (CallSession::new(factory, app_id.map(String::from)), log)
    }

    #[tokio::test]
    async fn missing_credential_fails_before_engine_is_touched() {
        let (mut session, log) = session(0, None);
        assert_eq!(session.join("chan", 7, false), Err(RtcError::MissingCredential));
        assert!(log.calls().is_empty());
        assert!(!session.has_engine());
    }

    #[tokio::test]
    async fn engine_error_code_is_surfaced() {
        let (mut session, _log) = session(-17, Some("app"));
        assert_eq!(session.join("chan", 7, true), Err(RtcError::Engine(-17)));
        assert_eq!(session.snapshot().connection, ConnectionState::Failed);
    }

    #[tokio::test]
    async fn setup_is_idempotent_and_leave_destroys() {
        let (mut session, log) = session(0, Some("app"));
        session.setup().unwrap();
        session.setup().unwrap();
        session.join("chan", 7, true).unwrap();
        session.leave();
        assert_eq!(
            log.calls(),
            ["create:app", "video:true", "join:chan", "leave", "release"]
        );

        // No engine: pass-throughs do nothing.
        session.toggle_mute();
        session.switch_camera();
        assert_eq!(log.calls().len(), 5);

        // A new call sets the engine up again.
        session.join("chan2", 7, false).unwrap();
        assert_eq!(log.calls()[5], "create:app");
    }

    #[tokio::test]
    async fn engine_callbacks_drive_state() {
        let (mut session, log) = session(0, Some("app"));
        let mut state = session.subscribe();
        session.join("chan", 7, false).unwrap();

        log.emit(RtcEvent::Joined { channel: "chan".into(), uid: 7 });
        log.emit(RtcEvent::PeerJoined { uid: 9 });
        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| s.remote_uid == Some(9)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.snapshot().connection, ConnectionState::Connected);

        log.emit(RtcEvent::PeerLeft { uid: 9 });
        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| s.remote_uid.is_none()))
            .await
            .unwrap()
            .unwrap();

        session.toggle_mute();
        assert!(session.snapshot().muted);
        session.toggle_mute();
        assert!(!session.snapshot().muted);
    }

    #[test]
    fn rtc_uid_is_stable_and_nonzero() {
        let user = Uuid::new_v4();
        assert_eq!(rtc_uid(user), rtc_uid(user));
        assert_ne!(rtc_uid(Uuid::nil()), 0);
    }
}
