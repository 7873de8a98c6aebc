//! Streaming engine
//!
//! [`StreamEngine`] runs one production thread per `play()` cycle. The thread
//! owns the [`BufferPool`] and the source while it runs, keeps the voice's
//! queue topped up, and publishes the playback position through an atomic.
//! The caller's side and the thread share only the small `Shared` block
//! below plus a signal channel.

mod config;
mod engine;
mod pool;
mod worker;

pub use config::{
    EngineConfig, DEFAULT_BUFFER_COUNT, DEFAULT_PROCESSING_INTERVAL_MS, DEFAULT_RETRY_COUNT,
};
pub use engine::StreamEngine;
pub use pool::{BufferPool, BufferSlot};

use crate::voice::VoiceStatus;
use crate::StreamError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ThreadId;
use std::time::Duration;

/// Intended playback state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not playing; no production thread alive
    #[default]
    Stopped,
    /// Paused in place; buffers stay queued
    Paused,
    /// Playing
    Playing,
}

impl From<VoiceStatus> for StreamState {
    fn from(status: VoiceStatus) -> Self {
        match status {
            VoiceStatus::Stopped => StreamState::Stopped,
            VoiceStatus::Paused => StreamState::Paused,
            VoiceStatus::Playing => StreamState::Playing,
        }
    }
}

/// Messages from the engine to its production thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Wind down and exit
    Stop,
    /// The caller changed the intended state
    Intent(StreamState),
}

/// Caller-visible streaming status
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Control {
    /// A production thread is running and has not wound down
    pub streaming: bool,
    /// Last state requested by the caller
    pub intent: StreamState,
}

/// State shared between the engine and its production thread
#[derive(Debug)]
pub(crate) struct Shared {
    pub control: Mutex<Control>,
    /// Interleaved samples played before the buffer at the head of the queue
    pub samples: AtomicU64,
    pub looping: AtomicBool,
    /// First error the production thread hit during the current cycle
    pub error: Mutex<Option<StreamError>>,
    pub worker_thread: Mutex<Option<ThreadId>>,
    pub interval_micros: AtomicU64,
}

impl Shared {
    pub fn new(interval: Duration) -> Self {
        Shared {
            control: Mutex::new(Control::default()),
            samples: AtomicU64::new(0),
            looping: AtomicBool::new(false),
            error: Mutex::new(None),
            worker_thread: Mutex::new(None),
            interval_micros: AtomicU64::new(duration_micros(interval)),
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    pub fn set_samples(&self, samples: u64) {
        self.samples.store(samples, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_micros.load(Ordering::Relaxed))
    }

    pub fn set_interval(&self, interval: Duration) {
        self.interval_micros
            .store(duration_micros(interval), Ordering::Relaxed);
    }

    /// Keep the first error of a cycle
    pub fn record_error(&self, err: StreamError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            log::error!("Audio stream aborted: {err}");
            *slot = Some(err);
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.control.lock().streaming
    }

    pub fn is_worker_thread(&self) -> bool {
        *self.worker_thread.lock() == Some(std::thread::current().id())
    }
}

fn duration_micros(interval: Duration) -> u64 {
    u64::try_from(interval.as_micros()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_voice_status() {
        assert_eq!(StreamState::from(VoiceStatus::Paused), StreamState::Paused);
        assert_eq!(StreamState::default(), StreamState::Stopped);
    }

    #[test]
    fn test_first_error_wins() {
        let shared = Shared::new(Duration::from_millis(1));
        shared.record_error(StreamError::ZeroBitDepth);
        shared.record_error(StreamError::WorkerPanicked);
        assert_eq!(*shared.error.lock(), Some(StreamError::ZeroBitDepth));
    }

    #[test]
    fn test_interval_never_zero() {
        let shared = Shared::new(Duration::ZERO);
        assert_eq!(shared.interval(), Duration::from_micros(1));
    }
}
