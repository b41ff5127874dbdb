use std::time::Duration;

const DEFAULT_TICK_INTERVAL_MS: u64 = 1;
const DEFAULT_STOP_POLL_INTERVAL_MS: u64 = 10;
const DEFAULT_OUTPUT_TIMEOUT_MS: u64 = 3000;

/// Configuration passed to the [`super::Engine`].
#[derive(Debug, Copy, Clone)]
pub struct EngineConfig {
    /// Pause between two scheduling ticks
    pub tick_interval: Duration,
    /// How often `stop` checks whether the scheduler has shut down
    pub stop_poll_interval: Duration,
    /// Bounded wait of the shared output sink
    pub output_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            stop_poll_interval: Duration::from_millis(DEFAULT_STOP_POLL_INTERVAL_MS),
            output_timeout: Duration::from_millis(DEFAULT_OUTPUT_TIMEOUT_MS),
        }
    }
}
