//! Playback voice capability
//!
//! A [`PlaybackVoice`] is one hardware or driver playback source fed through
//! a queue of buffers. The streaming engine only relies on the buffer-queue
//! contract defined here: fill a buffer, queue it, ask how many queued
//! buffers the device has finished, unqueue those, and drive
//! play/pause/stop. Device selection, mixing and spatialization stay behind
//! the implementation.
//!
//! Implementations:
//! - [`SimulatedVoice`]: in-memory voice with manual or wall-clock buffer
//!   consumption, used by tests and by the demo when no device is wanted
//! - `RodioVoice` (feature `rodio-output`): plays through a rodio `Sink`

use std::fmt;
use std::time::Duration;

#[cfg(feature = "rodio-output")]
pub mod rodio_voice;
pub mod simulated;

#[cfg(feature = "rodio-output")]
pub use rodio_voice::{RodioDevice, RodioVoice};
pub use simulated::{ConsumeMode, SimulatedVoice};

/// Channel counts most buffer-queue backends accept for 16-bit PCM
pub const COMMON_CHANNEL_LAYOUTS: [u32; 5] = [1, 2, 4, 6, 8];

/// Errors reported by a playback voice
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// The buffer handle does not belong to this voice
    #[error("Unknown buffer {0}")]
    UnknownBuffer(BufferId),

    /// The buffer is still queued and cannot be deleted or refilled
    #[error("Buffer {0} is still queued")]
    BufferInUse(BufferId),

    /// Unqueue was requested but no queued buffer has finished playing
    #[error("No processed buffer to unqueue")]
    NothingProcessed,

    /// A buffer without audio data cannot be queued
    #[error("Buffer {0} holds no audio data")]
    EmptyBuffer(BufferId),

    /// The output device is gone or could not be opened
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Any other failure reported by the backend
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Handle to one hardware buffer owned by a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status reported by the voice itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceStatus {
    /// Not playing (never started, stopped, or ran out of queued buffers)
    #[default]
    Stopped,
    /// Paused in place
    Paused,
    /// Consuming queued buffers
    Playing,
}

/// Hardware sample format resolved from a channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    /// Interleaved channels per frame
    pub channels: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl SampleFormat {
    /// Signed 16-bit little-endian PCM with the given channel count
    pub fn pcm16(channels: u32) -> Self {
        SampleFormat {
            channels,
            bits_per_sample: 16,
        }
    }

    /// Bytes per single-channel sample (0 when the bit depth is below 8)
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }
}

/// Size information the voice reports for a filled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Size of the buffered data in bytes
    pub size: usize,
    /// Bits per sample of the buffered data
    pub bits: u16,
}

impl BufferInfo {
    /// Interleaved samples held by the buffer, or `None` for a bit depth
    /// that cannot be divided into whole bytes
    pub fn sample_count(&self) -> Option<u64> {
        let bytes = u64::from(self.bits / 8);
        if bytes == 0 {
            None
        } else {
            Some(self.size as u64 / bytes)
        }
    }
}

/// Per-voice rendering parameters
///
/// Spatial parameters are passed through to the voice; the crate does no
/// positional math itself.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    /// Playback pitch multiplier (also changes speed)
    pub pitch: f32,
    /// Volume in the range [0, 100]
    pub volume: f32,
    /// Position in the 3-D audio scene
    pub position: [f32; 3],
    /// Interpret `position` relative to the listener instead of absolute
    pub relative_to_listener: bool,
    /// Distance under which the voice is heard at full volume
    pub min_distance: f32,
    /// Distance attenuation factor (0 disables attenuation)
    pub attenuation: f32,
}

impl VoiceParams {
    /// Check that every parameter is inside its allowed range
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.pitch.is_finite() && self.pitch > 0.0) {
            return Err(crate::StreamError::InvalidVoiceParams(format!(
                "pitch must be positive, got {}",
                self.pitch
            )));
        }
        if !(0.0..=100.0).contains(&self.volume) {
            return Err(crate::StreamError::InvalidVoiceParams(format!(
                "volume must be within [0, 100], got {}",
                self.volume
            )));
        }
        if !(self.min_distance.is_finite() && self.min_distance > 0.0) {
            return Err(crate::StreamError::InvalidVoiceParams(format!(
                "minimum distance must be positive, got {}",
                self.min_distance
            )));
        }
        if !(self.attenuation.is_finite() && self.attenuation >= 0.0) {
            return Err(crate::StreamError::InvalidVoiceParams(format!(
                "attenuation must not be negative, got {}",
                self.attenuation
            )));
        }
        if self.position.iter().any(|c| !c.is_finite()) {
            return Err(crate::StreamError::InvalidVoiceParams(
                "position must be finite".into(),
            ));
        }
        Ok(())
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        VoiceParams {
            pitch: 1.0,
            volume: 100.0,
            position: [0.0; 3],
            relative_to_listener: false,
            min_distance: 1.0,
            attenuation: 1.0,
        }
    }
}

/// Buffer-queue playback capability consumed by the streaming engine
///
/// All methods take `&self`: the engine calls into the voice from both the
/// application thread (pause, resume, status) and its production thread, so
/// implementations synchronize internally.
///
/// Queue model:
/// - buffers are filled with [`buffer_data`](Self::buffer_data) and appended
///   with [`queue_buffer`](Self::queue_buffer)
/// - buffers the device has finished stay queued and are counted by
///   [`processed_count`](Self::processed_count) until
///   [`unqueue_buffer`](Self::unqueue_buffer) pops them, oldest first
/// - a playing voice whose queue is fully processed reports
///   [`VoiceStatus::Stopped`]
/// - [`stop`](Self::stop) marks every queued buffer as processed
pub trait PlaybackVoice: Send + Sync {
    /// Hardware format for `channel_count` interleaved channels, or `None`
    /// if the layout is not supported
    fn resolve_format(&self, channel_count: u32) -> Option<SampleFormat>;

    /// Allocate `count` empty buffers
    fn create_buffers(&self, count: usize) -> Result<Vec<BufferId>, VoiceError>;

    /// Release buffers; none of them may still be queued
    fn delete_buffers(&self, buffers: &[BufferId]) -> Result<(), VoiceError>;

    /// Replace the content of `buffer` with `data` in the given format
    fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), VoiceError>;

    /// Size and bit depth of the data held by `buffer`
    fn buffer_info(&self, buffer: BufferId) -> Result<BufferInfo, VoiceError>;

    /// Append `buffer` to the play queue
    fn queue_buffer(&self, buffer: BufferId) -> Result<(), VoiceError>;

    /// Remove the oldest processed buffer from the queue
    fn unqueue_buffer(&self) -> Result<BufferId, VoiceError>;

    /// Number of queued buffers that finished playing
    fn processed_count(&self) -> Result<usize, VoiceError>;

    /// Number of buffers in the queue, processed or not
    fn queued_count(&self) -> Result<usize, VoiceError>;

    /// Start or resume consuming the queue
    fn play(&self) -> Result<(), VoiceError>;

    /// Pause in place
    fn pause(&self) -> Result<(), VoiceError>;

    /// Stop and mark every queued buffer as processed
    fn stop(&self) -> Result<(), VoiceError>;

    /// Current device-side status
    fn status(&self) -> Result<VoiceStatus, VoiceError>;

    /// Time already played from the buffer at the head of the queue
    fn elapsed(&self) -> Result<Duration, VoiceError>;

    /// Apply rendering parameters
    ///
    /// Voices that cannot honor some parameters ignore them.
    fn apply_params(&self, params: &VoiceParams) -> Result<(), VoiceError> {
        let _ = params;
        Ok(())
    }
}
