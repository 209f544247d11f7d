use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tandem_types::events::{CallEvent, IncomingCall};
use tandem_types::{CallInvite, CallStatus};

use crate::alerts::AlertCoordinator;
use crate::backend::Backend;
use crate::calls::CallInvites;
use crate::config::RealtimeConfig;
use crate::error::CallError;
use crate::rtc::CallSession;

struct Inner {
    user_id: Uuid,
    backend: Arc<dyn Backend>,
    calls: CallInvites,
    alerts: AlertCoordinator,
    ring_timeout: chrono::Duration,
    displayed: watch::Sender<Option<IncomingCall>>,
    events: mpsc::UnboundedSender<CallEvent>,
}

/// Session-wide incoming call detector.
///
/// While nothing is displayed, each tick asks for the newest ringing invite
/// addressed to the user. A found invite is displayed once and stays
/// displayed until it is answered, declined, expires or stops ringing
/// upstream; while it is displayed the loop only re-reads that one row, so the
/// same invite never rings twice.
#[derive(Clone)]
pub struct CallWatcher {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CallWatcher {
    /// Creates a watcher without starting its loop.
    pub fn new(
        backend: Arc<dyn Backend>,
        config: &RealtimeConfig,
        alerts: AlertCoordinator,
        user_id: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (displayed, _) = watch::channel(None);
        let inner = Inner {
            user_id,
            calls: CallInvites::new(backend.clone(), config),
            backend,
            alerts,
            ring_timeout: config.ring_timeout_chrono(),
            displayed,
            events,
        };
        let watcher = Self {
            inner: Arc::new(inner),
            cancel: CancellationToken::new(),
            task: Arc::new(Mutex::new(None)),
        };
        (watcher, rx)
    }

    /// Creates a watcher and spawns its poll loop. Must run inside a tokio
    /// runtime.
    pub fn start(
        backend: Arc<dyn Backend>,
        config: &RealtimeConfig,
        alerts: AlertCoordinator,
        user_id: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (watcher, rx) = Self::new(backend, config, alerts, user_id);
        let task = tokio::spawn(run_watch_loop(
            watcher.clone(),
            config.call_poll_interval,
            watcher.cancel.clone(),
        ));
        *watcher.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!("Call watcher started for {}", user_id);
        (watcher, rx)
    }

    pub fn user_id(&self) -> Uuid {
        self.inner.user_id
    }

    /// The call currently presented, if any.
    pub fn displayed(&self) -> Option<IncomingCall> {
        self.inner.displayed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<IncomingCall>> {
        self.inner.displayed.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    /// One detection pass. Failures are logged and retried next tick.
    pub async fn poll_once(&self) {
        match self.displayed() {
            Some(call) => self.recheck(call.invite).await,
            None => self.detect().await,
        }
    }

    async fn detect(&self) {
        let inner = &self.inner;
        let invite = match inner.backend.ringing_invite_for_callee(inner.user_id).await {
            Ok(Some(invite)) => invite,
            Ok(None) => return,
            Err(e) => {
                debug!("Ringing invite poll for {} failed: {}", inner.user_id, e);
                return;
            }
        };

        if invite.is_expired_at(Utc::now(), inner.ring_timeout) {
            if let Err(e) = inner.calls.expire(&invite).await {
                warn!("Expiring stale invite {} failed: {}", invite.id, e);
            }
            return;
        }

        let caller = match inner.backend.profile(invite.caller_id).await {
            Ok(profile) => profile,
            Err(e) => {
                debug!("Caller profile {} unavailable: {}", invite.caller_id, e);
                None
            }
        };
        let call = IncomingCall { invite, caller };

        let shown = inner.displayed.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(call.clone());
            true
        });
        if !shown {
            return;
        }
        inner.alerts.incoming_call(&call);
        info!("Incoming call {} from {}", call.invite.id, call.caller_name());
        let _ = inner.events.send(CallEvent::Incoming(call));
    }

    async fn recheck(&self, displayed: CallInvite) {
        let inner = &self.inner;
        match inner.calls.refresh(displayed.id).await {
            Ok(Some(current)) if current.status != CallStatus::Ringing => {
                self.dismiss(current.id, current.status);
            }
            Ok(Some(current)) => {
                if current.is_expired_at(Utc::now(), inner.ring_timeout) {
                    let status = match inner.calls.expire(&current).await {
                        Ok(expired) => expired.status,
                        Err(e) => {
                            warn!("Expiring invite {} failed: {}", current.id, e);
                            CallStatus::Missed
                        }
                    };
                    self.dismiss(current.id, status);
                }
            }
            Ok(None) => self.dismiss(displayed.id, CallStatus::Ended),
            Err(e) => debug!("Re-reading invite {} failed: {}", displayed.id, e),
        }
    }

    /// Answers the displayed call: joins its channel, then marks it active.
    /// On failure the prompt stays up so the user can retry or decline.
    pub async fn answer(&self, session: &mut CallSession) -> Result<CallInvite, CallError> {
        let call = self.displayed().ok_or(CallError::NoIncomingCall)?;
        self.inner.alerts.call_resolved(call.invite.id);
        let answered = self
            .inner
            .calls
            .answer(&call.invite, self.inner.user_id, session)
            .await?;
        self.dismiss(answered.id, answered.status);
        Ok(answered)
    }

    /// Declines the displayed call. No RTC work happens.
    pub async fn decline(&self) -> Result<CallInvite, CallError> {
        let call = self.displayed().ok_or(CallError::NoIncomingCall)?;
        self.inner.alerts.call_resolved(call.invite.id);
        let declined = self.inner.calls.decline(&call.invite, self.inner.user_id).await?;
        self.dismiss(declined.id, declined.status);
        Ok(declined)
    }

    /// Cancels the loop and drops whatever is displayed.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        if let Some(call) = self.displayed() {
            self.dismiss(call.invite.id, call.invite.status);
        }
        info!("Call watcher stopped for {}", self.inner.user_id);
    }

    /// Clears the prompt if it still shows `invite_id`. Only the first
    /// dismissal of an invite emits an event.
    fn dismiss(&self, invite_id: Uuid, status: CallStatus) {
        let inner = &self.inner;
        inner.alerts.call_resolved(invite_id);
        let cleared = inner.displayed.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|c| c.invite.id == invite_id) {
                *slot = None;
                true
            } else {
                false
            }
        });
        if cleared {
            debug!("Dismissed invite {} ({})", invite_id, status.as_str());
            let _ = inner.events.send(CallEvent::Dismissed { invite_id, status });
        }
    }
}

async fn run_watch_loop(watcher: CallWatcher, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = watcher.poll_once() => {}
                }
            }
        }
    }
    debug!("Call watch loop for {} exited", watcher.inner.user_id);
}
