use std::time::Duration;

use tracing::warn;

/// Timing and RTC settings for the realtime layer.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// How often an open conversation re-reads messages and typing state.
    pub message_poll_interval: Duration,
    /// How often the call watcher looks for ringing invites.
    pub call_poll_interval: Duration,
    /// A typing indicator older than this is treated as stopped.
    pub typing_ttl: Duration,
    /// Minimum gap between two typing upserts from the same client.
    pub typing_throttle: Duration,
    /// Inactivity after the last keystroke before the indicator is cleared.
    pub typing_idle: Duration,
    /// Ringing invites older than this are expired as missed.
    pub ring_timeout: Duration,
    /// Longest channel name the RTC engine accepts.
    pub max_channel_name_len: usize,
    /// Application credential for the RTC engine.
    pub rtc_app_id: Option<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            message_poll_interval: Duration::from_secs(1),
            call_poll_interval: Duration::from_secs(2),
            typing_ttl: Duration::from_secs(3),
            typing_throttle: Duration::from_secs(1),
            typing_idle: Duration::from_secs(2),
            ring_timeout: Duration::from_secs(30),
            max_channel_name_len: 64,
            rtc_app_id: None,
        }
    }
}

impl RealtimeConfig {
    /// Defaults overridden by `TANDEM_*` environment variables. Durations are
    /// given in milliseconds; unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_millis("TANDEM_MESSAGE_POLL_MS", &mut config.message_poll_interval);
        override_millis("TANDEM_CALL_POLL_MS", &mut config.call_poll_interval);
        override_millis("TANDEM_TYPING_TTL_MS", &mut config.typing_ttl);
        override_millis("TANDEM_TYPING_THROTTLE_MS", &mut config.typing_throttle);
        override_millis("TANDEM_TYPING_IDLE_MS", &mut config.typing_idle);
        override_millis("TANDEM_RING_TIMEOUT_MS", &mut config.ring_timeout);
        config.rtc_app_id = std::env::var("TANDEM_RTC_APP_ID")
            .ok()
            .filter(|v| !v.trim().is_empty());
        config
    }

    pub fn typing_ttl_chrono(&self) -> chrono::Duration {
        to_chrono(self.typing_ttl)
    }

    pub fn ring_timeout_chrono(&self) -> chrono::Duration {
        to_chrono(self.ring_timeout)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn override_millis(var: &str, slot: &mut Duration) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => *slot = Duration::from_millis(ms),
        _ => warn!("Ignoring {}={:?}: expected a positive number of milliseconds", var, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_polling_contract() {
        let config = RealtimeConfig::default();
        assert_eq!(config.message_poll_interval, Duration::from_secs(1));
        assert_eq!(config.call_poll_interval, Duration::from_secs(2));
        assert_eq!(config.typing_ttl_chrono(), chrono::Duration::seconds(3));
        assert!(config.rtc_app_id.is_none());
    }
}
