#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use tandem_db::Database;
use tandem_realtime::rtc::{JoinOptions, VideoProfile};
use tandem_realtime::{
    Alert, AlertCoordinator, AlertSink, Backend, LocalBackend, RealtimeConfig, RtcEngine,
    RtcEngineFactory, RtcError,
};
use tandem_types::events::RtcEvent;

pub struct Harness {
    pub db: Arc<Database>,
    pub backend: Arc<dyn Backend>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(db.clone()));
        Self { db, backend }
    }

    pub fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.db.upsert_user(id, name, None).unwrap();
        id
    }
}

/// Short intervals so loop tests finish quickly.
pub fn fast_config() -> RealtimeConfig {
    RealtimeConfig {
        message_poll_interval: Duration::from_millis(20),
        call_poll_interval: Duration::from_millis(20),
        typing_throttle: Duration::from_millis(50),
        typing_idle: Duration::from_millis(100),
        rtc_app_id: Some("test-app".into()),
        ..RealtimeConfig::default()
    }
}

#[derive(Default)]
pub struct Recorder(Mutex<Vec<Alert>>);

impl Recorder {
    pub fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, f: impl Fn(&Alert) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|a| f(a)).count()
    }
}

impl AlertSink for Recorder {
    fn apply(&self, alert: &Alert) {
        self.0.lock().unwrap().push(alert.clone());
    }
}

pub fn recording_alerts() -> (AlertCoordinator, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    (AlertCoordinator::new(recorder.clone()), recorder)
}

/// Engine that records joins and answers with a fixed status code.
#[derive(Default)]
pub struct FakeRtc {
    pub created: Mutex<usize>,
    pub joins: Mutex<Vec<(String, u32, bool)>>,
    pub released: Mutex<usize>,
    pub join_code: i32,
}

impl FakeRtc {
    pub fn failing(join_code: i32) -> Arc<Self> {
        Arc::new(Self {
            join_code,
            ..Self::default()
        })
    }

    pub fn joins(&self) -> Vec<(String, u32, bool)> {
        self.joins.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        *self.created.lock().unwrap()
    }
}

struct FakeEngine {
    rtc: Arc<FakeRtc>,
    video: bool,
}

impl RtcEngine for FakeEngine {
    fn configure_video(&mut self, profile: Option<VideoProfile>) {
        self.video = profile.is_some();
    }

    fn join_channel(&mut self, channel: &str, uid: u32, _options: &JoinOptions) -> i32 {
        self.rtc
            .joins
            .lock()
            .unwrap()
            .push((channel.to_string(), uid, self.video));
        self.rtc.join_code
    }

    fn leave_channel(&mut self) -> i32 {
        0
    }

    fn mute_local_audio(&mut self, _muted: bool) {}

    fn mute_local_video(&mut self, _muted: bool) {}

    fn switch_camera(&mut self) {}

    fn release(self: Box<Self>) {
        *self.rtc.released.lock().unwrap() += 1;
    }
}

pub struct FakeFactory(pub Arc<FakeRtc>);

impl RtcEngineFactory for FakeFactory {
    fn create(
        &self,
        _app_id: &str,
        _events: mpsc::UnboundedSender<RtcEvent>,
    ) -> Result<Box<dyn RtcEngine>, RtcError> {
        *self.0.created.lock().unwrap() += 1;
        Ok(Box::new(FakeEngine {
            rtc: self.0.clone(),
            video: false,
        }))
    }
}

/// Receives until `pred` matches, failing the test after two seconds.
pub async fn wait_for<T: std::fmt::Debug>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    pred: impl Fn(&T) -> bool,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
