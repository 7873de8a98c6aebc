//! Engine configuration

use crate::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of buffers kept in flight
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Extra `on_get_data` attempts after the first one before declaring starvation
pub const DEFAULT_RETRY_COUNT: u32 = 2;

/// Default wake-up period of the production thread in milliseconds
pub const DEFAULT_PROCESSING_INTERVAL_MS: u64 = 100;

/// Configuration for a [`StreamEngine`](super::StreamEngine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of playback buffers rotated between source and voice
    /// More buffers = more latency but less chance of underrun
    pub buffer_count: usize,

    /// Retries after a source reports "stop" before the stream winds down
    pub retry_count: u32,

    /// How long the production thread sleeps between refills
    /// Shorter = more responsive, more wake-ups
    pub processing_interval_ms: u64,
}

impl EngineConfig {
    /// Create a configuration optimized for stability
    /// 3 buffers, refilled every 100 ms
    pub fn stable() -> Self {
        EngineConfig {
            buffer_count: DEFAULT_BUFFER_COUNT,
            retry_count: DEFAULT_RETRY_COUNT,
            processing_interval_ms: DEFAULT_PROCESSING_INTERVAL_MS,
        }
    }

    /// Create a configuration optimized for low latency
    /// 4 buffers, refilled every 10 ms
    pub fn low_latency() -> Self {
        EngineConfig {
            buffer_count: 4,
            retry_count: DEFAULT_RETRY_COUNT,
            processing_interval_ms: 10,
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| StreamError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the production loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 {
            return Err(StreamError::InvalidConfig(
                "buffer_count must be at least 1".into(),
            ));
        }
        if self.processing_interval_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "processing_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Processing interval as a [`Duration`]
    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    /// Worst-case delay before a finished buffer is refilled, given the
    /// duration of one chunk
    pub fn latency_hint(&self, chunk_duration: Duration) -> Duration {
        chunk_duration * self.buffer_count as u32 + self.processing_interval()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::stable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let stable = EngineConfig::default();
        assert_eq!(stable.buffer_count, 3);
        assert_eq!(stable.retry_count, 2);
        assert_eq!(stable.processing_interval(), Duration::from_millis(100));

        let fast = EngineConfig::low_latency();
        assert!(fast.processing_interval() < stable.processing_interval());
        assert!(fast.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{ "processing_interval_ms": 20 }"#).unwrap();
        assert_eq!(config.processing_interval_ms, 20);
        assert_eq!(config.buffer_count, DEFAULT_BUFFER_COUNT);
        assert_eq!(config.retry_count, DEFAULT_RETRY_COUNT);
    }

    #[test]
    fn test_from_json_rejects_zero_buffers() {
        let err = EngineConfig::from_json(r#"{ "buffer_count": 0 }"#).unwrap_err();
        assert!(matches!(err, StreamError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_latency_hint() {
        let config = EngineConfig::stable();
        assert_eq!(
            config.latency_hint(Duration::from_millis(50)),
            Duration::from_millis(250)
        );
    }
}
