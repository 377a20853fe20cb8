use std::time::Duration;

use biobridge_core::BridgeConfig;
use biobridge_core::constants::*;

/// Identity and timings of one device session.
///
/// Build it from a [`BridgeConfig`] or override fields on
/// [`SessionConfig::default`]:
///
/// ```
/// use std::time::Duration;
/// use biobridge_session::SessionConfig;
///
/// let config = SessionConfig {
///     reconnect_backoff: Duration::from_millis(50),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.port, 4370);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub address: String,
    pub port: u16,

    /// Transport timeout for ordinary commands.
    pub connect_timeout: Duration,

    /// Transport timeout while enrolling.
    pub enroll_timeout: Duration,

    /// Read timeout of one live-stream poll.
    pub poll_interval: Duration,

    /// Pause after each delivered scan.
    pub record_delay: Duration,

    /// Bounded wait for the capture worker to exit.
    pub stop_wait: Duration,

    /// Wait before the automatic reconnection attempt.
    pub reconnect_backoff: Duration,

    /// Pause between close and connect on a manual reconnect.
    pub manual_reconnect_delay: Duration,

    /// Pause after opening the dedicated enrollment connection.
    pub enroll_settle: Duration,

    /// Longest an operation waits for the session before it is rejected.
    pub operation_wait: Duration,

    pub subscriber_capacity: usize,
}

impl SessionConfig {
    /// Stop wait actually used. Never shorter than one poll plus one
    /// record delay, so a stop is always observed before it returns.
    pub fn effective_stop_wait(&self) -> Duration {
        let floor = self.poll_interval + self.record_delay + Duration::from_millis(50);
        self.stop_wait.max(floor)
    }

    /// `address:port` for logs and status.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_DEVICE_ADDRESS.to_string(),
            port: DEFAULT_DEVICE_PORT,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            enroll_timeout: Duration::from_millis(DEFAULT_ENROLL_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            record_delay: Duration::from_millis(DEFAULT_RECORD_DELAY_MS),
            stop_wait: Duration::from_millis(DEFAULT_STOP_WAIT_MS),
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            manual_reconnect_delay: Duration::from_millis(DEFAULT_MANUAL_RECONNECT_DELAY_MS),
            enroll_settle: Duration::from_millis(DEFAULT_ENROLL_SETTLE_MS),
            operation_wait: Duration::from_millis(DEFAULT_OPERATION_WAIT_MS),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl From<&BridgeConfig> for SessionConfig {
    fn from(config: &BridgeConfig) -> Self {
        let fingerprint = &config.hardware.fingerprint;
        let tuning = &config.session;

        Self {
            address: fingerprint.ip.clone(),
            port: fingerprint.port,
            connect_timeout: Duration::from_secs(fingerprint.timeout),
            enroll_timeout: Duration::from_secs(fingerprint.enroll_timeout),
            poll_interval: Duration::from_millis(tuning.poll_interval_ms),
            record_delay: Duration::from_millis(tuning.record_delay_ms),
            stop_wait: Duration::from_millis(tuning.stop_wait_ms),
            reconnect_backoff: Duration::from_millis(tuning.reconnect_backoff_ms),
            manual_reconnect_delay: Duration::from_millis(tuning.manual_reconnect_delay_ms),
            enroll_settle: Duration::from_millis(tuning.enroll_settle_ms),
            operation_wait: Duration::from_millis(tuning.operation_wait_ms),
            subscriber_capacity: tuning.subscriber_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bridge_defaults() {
        let from_document = SessionConfig::from(&BridgeConfig::default());
        assert_eq!(from_document, SessionConfig::default());
    }

    #[test]
    fn test_from_bridge_config() {
        let bridge = BridgeConfig::from_json_str(
            r#"{
                "hardware": { "fingerprint": { "ip": "10.1.1.5", "timeout": 8, "enroll_timeout": 90 } },
                "session": { "reconnect_backoff_ms": 1500 }
            }"#,
        )
        .unwrap();

        let config = SessionConfig::from(&bridge);
        assert_eq!(config.endpoint(), "10.1.1.5:4370");
        assert_eq!(config.connect_timeout, Duration::from_secs(8));
        assert_eq!(config.enroll_timeout, Duration::from_secs(90));
        assert_eq!(config.reconnect_backoff, Duration::from_millis(1500));
    }

    #[test]
    fn test_effective_stop_wait_floor() {
        let config = SessionConfig {
            stop_wait: Duration::from_millis(10),
            poll_interval: Duration::from_millis(200),
            record_delay: Duration::from_millis(100),
            ..SessionConfig::default()
        };
        assert_eq!(config.effective_stop_wait(), Duration::from_millis(350));

        let defaults = SessionConfig::default();
        assert_eq!(defaults.effective_stop_wait(), Duration::from_millis(500));
    }
}
