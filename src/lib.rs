//! Continuous audio streaming
//!
//! Plays audio that is too large to decode up front, or that arrives
//! incrementally, by feeding a small rotating pool of playback buffers from a
//! pull-based source on a dedicated background thread.
//!
//! # Features
//! - Stopped / Paused / Playing state machine with lag-free status reporting
//! - Sample-accurate playback position across loops and seeks
//! - Loop boundaries resolved per buffer, honored only once that buffer drains
//! - Pluggable sources ([`StreamSource`]) and voices ([`PlaybackVoice`])
//! - In-memory [`SimulatedVoice`] for tests and headless use
//!
//! # Crate feature flags
//! - `wav` (default): load 16-bit PCM WAV files into a [`MemoryStream`] (enables `hound`)
//! - `rodio-output` (opt-in): play through the system audio device (enables `rodio`)
//!
//! # Quick start
//! ```no_run
//! use soundstream::{MemoryStream, SimulatedVoice, StreamEngine};
//! use std::sync::Arc;
//!
//! let tone: Vec<i16> = (0..44_100).map(|i| ((i as f32 * 0.05).sin() * 8_000.0) as i16).collect();
//! let source = MemoryStream::new(tone, 1, 44_100);
//! let voice = Arc::new(SimulatedVoice::realtime());
//!
//! let engine = StreamEngine::new(voice, Box::new(source));
//! engine.initialize(1, 44_100).unwrap();
//! engine.set_loop(true);
//! engine.play().unwrap();
//! println!("{:?}", engine.get_playing_offset().unwrap());
//! engine.stop().unwrap();
//! ```

#![warn(missing_docs)]

pub mod source; // Pull-based sources
pub mod stream; // Engine, buffer pool, production thread
pub mod time; // Sample / time conversion
pub mod voice; // Playback voice capability
#[cfg(feature = "wav")]
pub mod wav; // WAV loading

/// Broad category of a [`StreamError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The environment or input cannot be used (bad format, bad config)
    Configuration,
    /// The caller used the API in a way it does not allow
    Misuse,
    /// The playback backend or the worker thread failed
    Backend,
}

/// Error types for streaming operations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The voice has no sample format for this channel count
    #[error("Unsupported number of channels: {0}")]
    UnsupportedChannelCount(u32),

    /// Sample rate must be non-zero
    #[error("Sample rate must be non-zero")]
    InvalidSampleRate,

    /// A processed buffer reported zero bits per sample
    #[error("Bits in sound stream are 0: the audio format is corrupt or initialize() was not called correctly")]
    ZeroBitDepth,

    /// Invalid engine or source configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Voice parameter out of range
    #[error("Invalid voice parameters: {0}")]
    InvalidVoiceParams(String),

    /// `play()` before a successful `initialize()`
    #[error("Sound parameters have not been initialized (call initialize() first)")]
    NotInitialized,

    /// Operation requires the stream to be stopped
    #[error("Operation not allowed while streaming")]
    StreamingActive,

    /// Engine mutator called from inside a source callback
    #[error("Engine mutators cannot be called from the production thread")]
    CalledFromProducer,

    /// Failure reported by the playback voice
    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    /// The production thread could not be started
    #[error("Failed to spawn production thread: {0}")]
    ThreadSpawn(String),

    /// The production thread panicked
    #[error("Production thread panicked")]
    WorkerPanicked,

    /// Audio data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StreamError {
    /// Category used to tell caller mistakes from environment failures
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::UnsupportedChannelCount(_)
            | StreamError::InvalidSampleRate
            | StreamError::ZeroBitDepth
            | StreamError::InvalidConfig(_)
            | StreamError::InvalidVoiceParams(_)
            | StreamError::Decode(_) => ErrorKind::Configuration,
            StreamError::NotInitialized
            | StreamError::StreamingActive
            | StreamError::CalledFromProducer => ErrorKind::Misuse,
            StreamError::Voice(_) | StreamError::ThreadSpawn(_) | StreamError::WorkerPanicked => {
                ErrorKind::Backend
            }
        }
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

// Public API exports
pub use source::{Chunk, LoopSpan, MemoryStream, StreamSource};
pub use stream::{BufferPool, EngineConfig, StreamEngine, StreamState};
pub use time::SampleClock;
#[cfg(feature = "rodio-output")]
pub use voice::{RodioDevice, RodioVoice};
pub use voice::{
    BufferId, BufferInfo, PlaybackVoice, SampleFormat, SimulatedVoice, VoiceError, VoiceParams,
    VoiceStatus,
};
#[cfg(feature = "wav")]
pub use wav::load_wav;
