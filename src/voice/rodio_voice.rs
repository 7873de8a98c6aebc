//! Audio device output using rodio
//!
//! [`RodioDevice`] owns the output stream for the default device and hands
//! out [`RodioVoice`]s, one `Sink` each. Every queued buffer is appended to
//! the sink as its own `SamplesBuffer`, so the sink's pending-sound count
//! tells how many of our queued buffers are still playing.

use super::{
    BufferId, BufferInfo, PlaybackVoice, SampleFormat, VoiceError, VoiceParams, VoiceStatus,
    COMMON_CHANNEL_LAYOUTS,
};
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Output stream on the system's default audio device
///
/// Must outlive every voice created from it; dropping it silences them.
pub struct RodioDevice {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl RodioDevice {
    /// Open the default output device
    pub fn open_default() -> Result<Self, VoiceError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
        Ok(RodioDevice {
            _stream: stream,
            handle,
        })
    }

    /// Create a new voice playing on this device
    pub fn create_voice(&self) -> Result<RodioVoice, VoiceError> {
        let sink =
            Sink::try_new(&self.handle).map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
        sink.pause();
        Ok(RodioVoice {
            sink,
            inner: Mutex::new(Inner::default()),
        })
    }
}

#[derive(Clone)]
struct PcmData {
    samples: Arc<[i16]>,
    format: SampleFormat,
    sample_rate: u32,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    buffers: HashMap<BufferId, Option<PcmData>>,
    queue: VecDeque<BufferId>,
    /// Queue entries forced to processed by `stop`
    flushed: usize,
    state: VoiceStatus,
}

impl Inner {
    fn processed(&self, in_sink: usize) -> usize {
        let drained = self.queue.len().saturating_sub(in_sink);
        drained.max(self.flushed).min(self.queue.len())
    }
}

/// Playback voice backed by a rodio `Sink`
///
/// `elapsed` always reports zero: the sink does not expose its position
/// inside the current buffer.
pub struct RodioVoice {
    sink: Sink,
    inner: Mutex<Inner>,
}

impl PlaybackVoice for RodioVoice {
    fn resolve_format(&self, channel_count: u32) -> Option<SampleFormat> {
        COMMON_CHANNEL_LAYOUTS
            .contains(&channel_count)
            .then(|| SampleFormat::pcm16(channel_count))
    }

    fn create_buffers(&self, count: usize) -> Result<Vec<BufferId>, VoiceError> {
        let mut inner = self.inner.lock();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            inner.next_id += 1;
            let id = BufferId(inner.next_id);
            inner.buffers.insert(id, None);
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        for id in buffers {
            if inner.queue.contains(id) {
                return Err(VoiceError::BufferInUse(*id));
            }
            inner
                .buffers
                .remove(id)
                .ok_or(VoiceError::UnknownBuffer(*id))?;
        }
        Ok(())
    }

    fn buffer_data(
        &self,
        buffer: BufferId,
        format: SampleFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), VoiceError> {
        if format.bits_per_sample != 16 {
            return Err(VoiceError::Backend(format!(
                "unsupported bit depth {}",
                format.bits_per_sample
            )));
        }

        let mut inner = self.inner.lock();
        if inner.queue.contains(&buffer) {
            return Err(VoiceError::BufferInUse(buffer));
        }
        let slot = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?;

        let samples: Arc<[i16]> = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        *slot = Some(PcmData {
            samples,
            format,
            sample_rate,
        });
        Ok(())
    }

    fn buffer_info(&self, buffer: BufferId) -> Result<BufferInfo, VoiceError> {
        let inner = self.inner.lock();
        let data = inner
            .buffers
            .get(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?;
        Ok(match data {
            Some(pcm) => BufferInfo {
                size: pcm.samples.len() * 2,
                bits: pcm.format.bits_per_sample,
            },
            None => BufferInfo { size: 0, bits: 16 },
        })
    }

    fn queue_buffer(&self, buffer: BufferId) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        if inner.queue.contains(&buffer) {
            return Err(VoiceError::BufferInUse(buffer));
        }
        let pcm = inner
            .buffers
            .get(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?
            .clone()
            .filter(|pcm| !pcm.samples.is_empty())
            .ok_or(VoiceError::EmptyBuffer(buffer))?;

        let channels = u16::try_from(pcm.format.channels)
            .map_err(|_| VoiceError::Backend("channel count out of range".into()))?;
        self.sink.append(SamplesBuffer::new(
            channels,
            pcm.sample_rate,
            pcm.samples.to_vec(),
        ));
        inner.queue.push_back(buffer);
        Ok(())
    }

    fn unqueue_buffer(&self) -> Result<BufferId, VoiceError> {
        let mut inner = self.inner.lock();
        if inner.processed(self.sink.len()) == 0 {
            return Err(VoiceError::NothingProcessed);
        }
        let id = inner.queue.pop_front().ok_or(VoiceError::NothingProcessed)?;
        inner.flushed = inner.flushed.saturating_sub(1);
        Ok(id)
    }

    fn processed_count(&self) -> Result<usize, VoiceError> {
        Ok(self.inner.lock().processed(self.sink.len()))
    }

    fn queued_count(&self) -> Result<usize, VoiceError> {
        Ok(self.inner.lock().queue.len())
    }

    fn play(&self) -> Result<(), VoiceError> {
        self.inner.lock().state = VoiceStatus::Playing;
        self.sink.play();
        Ok(())
    }

    fn pause(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        if inner.state == VoiceStatus::Playing {
            inner.state = VoiceStatus::Paused;
        }
        self.sink.pause();
        Ok(())
    }

    fn stop(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.state = VoiceStatus::Stopped;
        inner.flushed = inner.queue.len();
        self.sink.stop();
        self.sink.pause();
        Ok(())
    }

    fn status(&self) -> Result<VoiceStatus, VoiceError> {
        let inner = self.inner.lock();
        let pending = inner.queue.len() - inner.processed(self.sink.len());
        Ok(match inner.state {
            VoiceStatus::Playing if pending == 0 => VoiceStatus::Stopped,
            state => state,
        })
    }

    fn elapsed(&self) -> Result<Duration, VoiceError> {
        Ok(Duration::ZERO)
    }

    fn apply_params(&self, params: &VoiceParams) -> Result<(), VoiceError> {
        self.sink.set_volume(params.volume / 100.0);
        self.sink.set_speed(params.pitch);
        Ok(())
    }
}
