use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use tandem_types::events::PushPayload;
use tandem_types::{CallInvite, Message};

use crate::auth::AppState;

/// Forwards push payloads to an external delivery webhook.
#[derive(Clone)]
pub struct PushNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl PushNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }

    pub async fn deliver(&self, payload: &PushPayload) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Best-effort push for a new message. Runs in the background; failures are
/// only logged.
pub(crate) fn message_created(state: &AppState, message: &Message, recipient: Uuid) {
    if state.push.is_none() {
        return;
    }
    let state = state.clone();
    let message = message.clone();
    tokio::spawn(async move {
        let sender = message.sender_id;
        let Some((token, name)) = lookup(&state, recipient, sender).await else {
            return;
        };
        let payload = PushPayload::for_message(token, &name, &message);
        send(&state, &payload, recipient).await;
    });
}

/// Best-effort push for a new ringing invite.
pub(crate) fn invite_created(state: &AppState, invite: &CallInvite) {
    if state.push.is_none() {
        return;
    }
    let state = state.clone();
    let invite = invite.clone();
    tokio::spawn(async move {
        let Some((token, name)) = lookup(&state, invite.callee_id, invite.caller_id).await else {
            return;
        };
        let payload = PushPayload::for_invite(token, &name, &invite);
        send(&state, &payload, invite.callee_id).await;
    });
}

/// Recipient's device token and the sender's display name.
async fn lookup(state: &AppState, recipient: Uuid, sender: Uuid) -> Option<(String, String)> {
    let db_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let token = db_state.db.get_device_token(recipient)?;
        let name = db_state
            .db
            .get_user(sender)?
            .map(|u| u.display_name)
            .unwrap_or_else(|| "Someone".to_string());
        Ok::<_, anyhow::Error>(token.map(|t| (t, name)))
    })
    .await;

    match result {
        Ok(Ok(Some(found))) => Some(found),
        Ok(Ok(None)) => {
            debug!("No device token for {}, skipping push", recipient);
            None
        }
        Ok(Err(e)) => {
            warn!("Push lookup for {} failed: {:#}", recipient, e);
            None
        }
        Err(e) => {
            warn!("Push lookup task failed: {}", e);
            None
        }
    }
}

async fn send(state: &AppState, payload: &PushPayload, recipient: Uuid) {
    let Some(push) = state.push.as_ref() else {
        return;
    };
    match push.deliver(payload).await {
        Ok(()) => debug!("Push delivered to {}", recipient),
        Err(e) => warn!("Push to {} failed: {}", recipient, e),
    }
}
