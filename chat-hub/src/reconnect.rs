//! Automatic reconnection policy.

use std::time::Duration;

use chat_core::config::ReconnectSettings;

/// Configuration for hub reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay between reconnection attempts.
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    pub max_delay: Duration,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) added to each delay.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&ReconnectSettings::default())
    }
}

impl From<&ReconnectSettings> for ReconnectConfig {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_attempts: settings.max_attempts,
            jitter_factor: settings.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

impl ReconnectConfig {
    /// Whether `attempt` (1-based) is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }

    /// Calculate the delay before reconnection attempt `attempt` (0-based)
    /// using exponential backoff with jitter.
    ///
    /// With the defaults: 1s, 2s, 4s, 8s, 16s, capped at 30s, each +/- 30%,
    /// never below 0.5s.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();

        let exponential = (base * 2.0_f64.powi(attempt.min(30) as i32)).min(max);

        let jitter_range = exponential * self.jitter_factor;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let delay = (exponential + jitter).max(0.5);

        Duration::from_secs_f64(delay)
    }
}
