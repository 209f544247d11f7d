use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use tandem_types::CallType;
use tandem_types::events::IncomingCall;

/// User-visible side effects: ringtone, local notification, badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    StartRinging { invite_id: Uuid, call_type: CallType },
    StopRinging { invite_id: Uuid },
    ScheduleNotification { invite_id: Uuid, title: String, body: String },
    CancelNotification { invite_id: Uuid },
    BadgeChanged { unread: usize },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartRinging { invite_id, call_type } => {
                write!(f, "start_ringing invite={} type={}", invite_id, call_type.as_str())
            }
            Self::StopRinging { invite_id } => write!(f, "stop_ringing invite={}", invite_id),
            Self::ScheduleNotification { invite_id, title, .. } => {
                write!(f, "schedule_notification invite={} title={:?}", invite_id, title)
            }
            Self::CancelNotification { invite_id } => {
                write!(f, "cancel_notification invite={}", invite_id)
            }
            Self::BadgeChanged { unread } => write!(f, "badge unread={}", unread),
        }
    }
}

/// Platform adapter that plays sounds, vibrates and posts notifications.
pub trait AlertSink: Send + Sync {
    fn apply(&self, alert: &Alert);
}

/// Sink that only logs, for headless runs.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn apply(&self, alert: &Alert) {
        match alert {
            Alert::BadgeChanged { .. } => tracing::debug!(component = "alerts", "{}", alert),
            _ => tracing::info!(component = "alerts", "{}", alert),
        }
    }
}

/// Sink that discards everything.
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn apply(&self, _alert: &Alert) {}
}

#[derive(Default)]
struct AlertState {
    ringing: Option<Uuid>,
    unread: HashMap<Uuid, usize>,
}

/// Single owner of ring, notification and badge state.
///
/// Call and message components report state transitions here instead of
/// touching the platform directly, which keeps "is something ringing" in
/// one place and makes repeated reports of the same invite harmless.
#[derive(Clone)]
pub struct AlertCoordinator {
    sink: Arc<dyn AlertSink>,
    state: Arc<Mutex<AlertState>>,
}

impl AlertCoordinator {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(AlertState::default())),
        }
    }

    /// Starts ringing and schedules the fallback notification. Returns false
    /// without side effects if this invite is already ringing.
    pub fn incoming_call(&self, call: &IncomingCall) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let invite_id = call.invite.id;
        if state.ringing == Some(invite_id) {
            return false;
        }
        if let Some(previous) = state.ringing.take() {
            self.stop(previous);
        }
        state.ringing = Some(invite_id);

        self.sink.apply(&Alert::StartRinging {
            invite_id,
            call_type: call.invite.call_type,
        });
        let kind = if call.invite.call_type.is_video() { "video" } else { "voice" };
        self.sink.apply(&Alert::ScheduleNotification {
            invite_id,
            title: call.caller_name().to_string(),
            body: format!("Incoming {} call", kind),
        });
        true
    }

    /// Stops ringing and cancels the notification for `invite_id`, if it is
    /// the one ringing.
    pub fn call_resolved(&self, invite_id: Uuid) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ringing == Some(invite_id) {
            state.ringing = None;
            self.stop(invite_id);
        }
    }

    pub fn ringing(&self) -> Option<Uuid> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).ringing
    }

    /// Records the unread count of one conversation and republishes the
    /// total when it changes.
    pub fn set_unread(&self, match_id: Uuid, count: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before: usize = state.unread.values().sum();
        if count == 0 {
            state.unread.remove(&match_id);
        } else {
            state.unread.insert(match_id, count);
        }
        let after: usize = state.unread.values().sum();
        if before != after {
            self.sink.apply(&Alert::BadgeChanged { unread: after });
        }
    }

    pub fn unread_total(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unread
            .values()
            .sum()
    }

    /// Silences everything, e.g. on sign-out.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(invite_id) = state.ringing.take() {
            self.stop(invite_id);
        }
        if !state.unread.is_empty() {
            state.unread.clear();
            self.sink.apply(&Alert::BadgeChanged { unread: 0 });
        }
    }

    fn stop(&self, invite_id: Uuid) {
        self.sink.apply(&Alert::StopRinging { invite_id });
        self.sink.apply(&Alert::CancelNotification { invite_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tandem_types::{CallInvite, CallStatus};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Alert>>);

    impl AlertSink for Recorder {
        fn apply(&self, alert: &Alert) {
            self.0.lock().unwrap().push(alert.clone());
        }
    }

    fn incoming() -> IncomingCall {
        IncomingCall {
            invite: CallInvite {
                id: Uuid::new_v4(),
                match_id: Uuid::new_v4(),
                caller_id: Uuid::new_v4(),
                callee_id: Uuid::new_v4(),
                channel_name: "c".into(),
                call_type: CallType::Voice,
                status: CallStatus::Ringing,
                created_at: Utc::now(),
            },
            caller: None,
        }
    }

    #[test]
    fn same_invite_rings_once() {
        let recorder = Arc::new(Recorder::default());
        let alerts = AlertCoordinator::new(recorder.clone());
        let call = incoming();

        assert!(alerts.incoming_call(&call));
        assert!(!alerts.incoming_call(&call));
        assert_eq!(recorder.0.lock().unwrap().len(), 2);

        alerts.call_resolved(call.invite.id);
        alerts.call_resolved(call.invite.id);
        let log = recorder.0.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[2], Alert::StopRinging { invite_id: call.invite.id });
        assert_eq!(log[3], Alert::CancelNotification { invite_id: call.invite.id });
    }

    #[test]
    fn badge_sums_conversations() {
        let recorder = Arc::new(Recorder::default());
        let alerts = AlertCoordinator::new(recorder.clone());
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        alerts.set_unread(m1, 2);
        alerts.set_unread(m2, 1);
        alerts.set_unread(m2, 1);
        alerts.set_unread(m1, 0);
        assert_eq!(alerts.unread_total(), 1);

        let badges: Vec<usize> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| match a {
                Alert::BadgeChanged { unread } => Some(*unread),
                _ => None,
            })
            .collect();
        assert_eq!(badges, vec![2, 3, 1]);
    }

    struct PanickingSink;

    impl AlertSink for PanickingSink {
        fn apply(&self, _alert: &Alert) {
            panic!("sink failed");
        }
    }

    #[test]
    fn panicking_sink_does_not_wedge_the_coordinator() {
        let alerts = AlertCoordinator::new(Arc::new(PanickingSink));
        let call = incoming();
        let poisoned = std::thread::scope(|s| {
            s.spawn(|| alerts.incoming_call(&call)).join().is_err()
        });
        assert!(poisoned);
        assert!(alerts.state.is_poisoned());

        assert_eq!(alerts.ringing(), Some(call.invite.id));
        alerts.set_unread(Uuid::new_v4(), 0);
        assert_eq!(alerts.unread_total(), 0);
    }
}
