use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::auth::{AppState, blocking};

/// Background task that prunes rows clients left behind.
///
/// Typing indicators past their TTL are deleted and invites that kept
/// ringing past the ring timeout are marked missed, so a client that crashed
/// mid-type or mid-call leaves nothing live behind.
pub async fn run_sweep_loop(
    state: AppState,
    typing_ttl: Duration,
    ring_timeout: Duration,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match sweep_once(&state, typing_ttl, ring_timeout).await {
            Ok((0, 0)) => debug!("Sweep: nothing stale"),
            Ok((typing, invites)) => {
                info!("Sweep: removed {} typing rows, expired {} invites", typing, invites)
            }
            Err(e) => warn!("Sweep failed with status {}", e),
        }
    }
}

/// Returns (typing rows deleted, invites expired).
pub async fn sweep_once(
    state: &AppState,
    typing_ttl: Duration,
    ring_timeout: Duration,
) -> Result<(usize, usize), axum::http::StatusCode> {
    let now = Utc::now();
    let typing_cutoff = now - chrono::Duration::from_std(typing_ttl).unwrap_or_default();
    let ring_cutoff = now - chrono::Duration::from_std(ring_timeout).unwrap_or_default();

    blocking(state, move |db| {
        let typing = db.delete_typing_before(typing_cutoff)?;
        let invites = db.expire_ringing_before(ring_cutoff)?;
        Ok((typing, invites))
    })
    .await
}
