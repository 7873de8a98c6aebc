//! In-memory playback voice
//!
//! [`SimulatedVoice`] implements the full buffer-queue contract without any
//! audio hardware. In [`ConsumeMode::Manual`] queued buffers only finish when
//! [`SimulatedVoice::consume`] is called, which lets tests step the
//! production loop deterministically. In [`ConsumeMode::Realtime`] buffers
//! drain at the wall-clock rate implied by their sample rate and channel
//! count, which is what the demo binary uses when no device is wanted.

use super::{
    BufferId, BufferInfo, PlaybackVoice, SampleFormat, VoiceError, VoiceParams, VoiceStatus,
    COMMON_CHANNEL_LAYOUTS,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// How queued buffers get consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// Only [`SimulatedVoice::consume`] finishes buffers
    Manual,
    /// Buffers drain at their natural playback speed
    Realtime,
}

#[derive(Debug, Clone, Copy, Default)]
struct BufferData {
    size: usize,
    bits: u16,
    channels: u32,
    sample_rate: u32,
}

impl BufferData {
    fn duration(&self) -> Duration {
        let bytes = u64::from(self.bits / 8);
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels);
        if bytes == 0 || per_second == 0 {
            return Duration::ZERO;
        }
        let samples = self.size as u64 / bytes;
        Duration::from_secs_f64(samples as f64 / per_second as f64)
    }
}

#[derive(Debug)]
struct Inner {
    next_id: u32,
    buffers: HashMap<BufferId, BufferData>,
    queue: VecDeque<BufferId>,
    /// Leading queue entries that finished playing
    processed: usize,
    state: VoiceStatus,
    head_played: Duration,
    last_tick: Option<Instant>,
    failure: Option<VoiceError>,
    reported_bits: Option<u16>,
    params: VoiceParams,
    play_calls: usize,
}

impl Inner {
    fn pending(&self) -> usize {
        self.queue.len() - self.processed
    }

    fn check_failure(&self) -> Result<(), VoiceError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn finish_head(&mut self) {
        self.processed += 1;
        self.head_played = Duration::ZERO;
    }

    /// Ran out of pending buffers while playing
    fn settle(&mut self) {
        if self.state == VoiceStatus::Playing && self.pending() == 0 {
            self.state = VoiceStatus::Stopped;
            self.head_played = Duration::ZERO;
            self.last_tick = None;
        }
    }

    fn advance(&mut self, mode: ConsumeMode) {
        if mode == ConsumeMode::Manual || self.state != VoiceStatus::Playing {
            return;
        }

        let now = Instant::now();
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };
        self.head_played += now.saturating_duration_since(last);

        while self.pending() > 0 {
            let head = self.queue[self.processed];
            let length = self
                .buffers
                .get(&head)
                .map(BufferData::duration)
                .unwrap_or_default();
            if self.head_played < length {
                break;
            }
            self.head_played -= length;
            self.processed += 1;
        }
        self.settle();
    }
}

/// Playback voice backed by plain memory
pub struct SimulatedVoice {
    mode: ConsumeMode,
    supported_channels: Vec<u32>,
    inner: Mutex<Inner>,
}

impl SimulatedVoice {
    /// Voice whose buffers only finish through [`consume`](Self::consume)
    pub fn new() -> Self {
        Self::with_mode(ConsumeMode::Manual)
    }

    /// Voice whose buffers drain at wall-clock speed
    pub fn realtime() -> Self {
        Self::with_mode(ConsumeMode::Realtime)
    }

    /// Voice with an explicit consumption mode
    pub fn with_mode(mode: ConsumeMode) -> Self {
        SimulatedVoice {
            mode,
            supported_channels: COMMON_CHANNEL_LAYOUTS.to_vec(),
            inner: Mutex::new(Inner {
                next_id: 1,
                buffers: HashMap::new(),
                queue: VecDeque::new(),
                processed: 0,
                state: VoiceStatus::Stopped,
                head_played: Duration::ZERO,
                last_tick: None,
                failure: None,
                reported_bits: None,
                params: VoiceParams::default(),
                play_calls: 0,
            }),
        }
    }

    /// Restrict the channel layouts [`resolve_format`](PlaybackVoice::resolve_format) accepts
    pub fn with_supported_channels(mut self, channels: Vec<u32>) -> Self {
        self.supported_channels = channels;
        self
    }

    /// Consumption mode
    pub fn mode(&self) -> ConsumeMode {
        self.mode
    }

    /// Finish up to `count` pending buffers, oldest first
    ///
    /// Does nothing unless the voice is playing. Returns how many buffers
    /// were finished.
    pub fn consume(&self, count: usize) -> usize {
        let mut inner = self.inner.lock();
        if inner.state != VoiceStatus::Playing {
            return 0;
        }

        let finished = count.min(inner.pending());
        for _ in 0..finished {
            inner.finish_head();
        }
        inner.settle();
        finished
    }

    /// Make every fallible voice call fail with `failure` until cleared
    pub fn set_failure(&self, failure: Option<VoiceError>) {
        self.inner.lock().failure = failure;
    }

    /// Override the bit depth reported by [`buffer_info`](PlaybackVoice::buffer_info)
    pub fn set_reported_bit_depth(&self, bits: Option<u16>) {
        self.inner.lock().reported_bits = bits;
    }

    /// Buffers currently in the queue, processed or not
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Queued buffers not played yet
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending()
    }

    /// Buffers allocated and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// How many times [`play`](PlaybackVoice::play) was called
    pub fn play_calls(&self) -> usize {
        self.inner.lock().play_calls
    }

    /// Last parameters applied to the voice
    pub fn params(&self) -> VoiceParams {
        self.inner.lock().params
    }

    /// Commanded state, without the out-of-data transition applied
    pub fn raw_state(&self) -> VoiceStatus {
        self.inner.lock().state
    }
}

impl Default for SimulatedVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackVoice for SimulatedVoice {
    fn resolve_format(&self, channel_count: u32) -> Option<SampleFormat> {
        self.supported_channels
            .contains(&channel_count)
            .then(|| SampleFormat::pcm16(channel_count))
    }

    fn create_buffers(&self, count: usize) -> Result<Vec<BufferId>, VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = BufferId(inner.next_id);
            inner.next_id += 1;
            inner.buffers.insert(id, BufferData::default());
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_buffers(&self, buffers: &[BufferId]) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;

        for id in buffers {
            if inner.queue.contains(id) {
                return Err(VoiceError::BufferInUse(*id));
            }
            if !inner.buffers.contains_key(id) {
                return Err(VoiceError::UnknownBuffer(*id));
            }
        }
        for id in buffers {
            inner.buffers.remove(id);
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
        let mut inner = self.inner.lock();
        inner.check_failure()?;

        if inner.queue.contains(&buffer) {
            return Err(VoiceError::BufferInUse(buffer));
        }
        let slot = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?;
        *slot = BufferData {
            size: data.len(),
            bits: format.bits_per_sample,
            channels: format.channels,
            sample_rate,
        };
        Ok(())
    }

    fn buffer_info(&self, buffer: BufferId) -> Result<BufferInfo, VoiceError> {
        let inner = self.inner.lock();
        inner.check_failure()?;

        let data = inner
            .buffers
            .get(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?;
        Ok(BufferInfo {
            size: data.size,
            bits: inner.reported_bits.unwrap_or(data.bits),
        })
    }

    fn queue_buffer(&self, buffer: BufferId) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;

        let data = inner
            .buffers
            .get(&buffer)
            .ok_or(VoiceError::UnknownBuffer(buffer))?;
        if data.size == 0 {
            return Err(VoiceError::EmptyBuffer(buffer));
        }
        if inner.queue.contains(&buffer) {
            return Err(VoiceError::BufferInUse(buffer));
        }
        inner.queue.push_back(buffer);
        Ok(())
    }

    fn unqueue_buffer(&self) -> Result<BufferId, VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);

        if inner.processed == 0 {
            return Err(VoiceError::NothingProcessed);
        }
        let id = inner.queue.pop_front().ok_or(VoiceError::NothingProcessed)?;
        inner.processed -= 1;
        Ok(id)
    }

    fn processed_count(&self) -> Result<usize, VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);
        Ok(inner.processed)
    }

    fn queued_count(&self) -> Result<usize, VoiceError> {
        let inner = self.inner.lock();
        inner.check_failure()?;
        Ok(inner.queue.len())
    }

    fn play(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);

        inner.play_calls += 1;
        if inner.state != VoiceStatus::Playing {
            inner.state = VoiceStatus::Playing;
            inner.last_tick = Some(Instant::now());
        }
        inner.settle();
        Ok(())
    }

    fn pause(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);

        if inner.state == VoiceStatus::Playing {
            inner.state = VoiceStatus::Paused;
            inner.last_tick = None;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;

        inner.state = VoiceStatus::Stopped;
        inner.processed = inner.queue.len();
        inner.head_played = Duration::ZERO;
        inner.last_tick = None;
        Ok(())
    }

    fn status(&self) -> Result<VoiceStatus, VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);
        inner.settle();
        Ok(inner.state)
    }

    fn elapsed(&self) -> Result<Duration, VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.advance(self.mode);
        Ok(inner.head_played)
    }

    fn apply_params(&self, params: &VoiceParams) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock();
        inner.check_failure()?;
        inner.params = *params;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_buffers(voice: &SimulatedVoice, count: usize) -> Vec<BufferId> {
        let ids = voice.create_buffers(count).unwrap();
        for id in &ids {
            voice
                .buffer_data(*id, SampleFormat::pcm16(1), &[0u8; 200], 44_100)
                .unwrap();
        }
        ids
    }

    #[test]
    fn test_resolve_format_rejects_seven_channels() {
        let voice = SimulatedVoice::new();
        assert_eq!(voice.resolve_format(2), Some(SampleFormat::pcm16(2)));
        assert_eq!(voice.resolve_format(7), None);
    }

    #[test]
    fn test_queue_consume_unqueue() {
        let voice = SimulatedVoice::new();
        let ids = filled_buffers(&voice, 3);
        for id in &ids {
            voice.queue_buffer(*id).unwrap();
        }

        // Consumption requires a playing voice
        assert_eq!(voice.consume(1), 0);

        voice.play().unwrap();
        assert_eq!(voice.consume(2), 2);
        assert_eq!(voice.processed_count().unwrap(), 2);
        assert_eq!(voice.queued_count().unwrap(), 3);

        assert_eq!(voice.unqueue_buffer().unwrap(), ids[0]);
        assert_eq!(voice.unqueue_buffer().unwrap(), ids[1]);
        assert_eq!(voice.unqueue_buffer(), Err(VoiceError::NothingProcessed));
        assert_eq!(voice.status().unwrap(), VoiceStatus::Playing);
    }

    #[test]
    fn test_drained_voice_reports_stopped() {
        let voice = SimulatedVoice::new();
        let ids = filled_buffers(&voice, 1);
        voice.queue_buffer(ids[0]).unwrap();
        voice.play().unwrap();

        assert_eq!(voice.consume(5), 1);
        assert_eq!(voice.status().unwrap(), VoiceStatus::Stopped);
    }

    #[test]
    fn test_stop_marks_everything_processed() {
        let voice = SimulatedVoice::new();
        for id in filled_buffers(&voice, 3) {
            voice.queue_buffer(id).unwrap();
        }
        voice.play().unwrap();
        voice.stop().unwrap();

        assert_eq!(voice.processed_count().unwrap(), 3);
        for _ in 0..3 {
            voice.unqueue_buffer().unwrap();
        }
        assert_eq!(voice.queued_count().unwrap(), 0);
    }

    #[test]
    fn test_queued_buffer_cannot_be_deleted_or_refilled() {
        let voice = SimulatedVoice::new();
        let ids = filled_buffers(&voice, 1);
        voice.queue_buffer(ids[0]).unwrap();

        assert_eq!(
            voice.delete_buffers(&ids),
            Err(VoiceError::BufferInUse(ids[0]))
        );
        assert_eq!(
            voice.buffer_data(ids[0], SampleFormat::pcm16(1), &[1, 2], 8_000),
            Err(VoiceError::BufferInUse(ids[0]))
        );
    }

    #[test]
    fn test_empty_buffer_cannot_be_queued() {
        let voice = SimulatedVoice::new();
        let ids = voice.create_buffers(1).unwrap();
        assert_eq!(voice.queue_buffer(ids[0]), Err(VoiceError::EmptyBuffer(ids[0])));
    }

    #[test]
    fn test_failure_is_sticky_until_cleared() {
        let voice = SimulatedVoice::new();
        voice.set_failure(Some(VoiceError::Backend("device lost".into())));
        assert!(voice.play().is_err());
        assert!(voice.status().is_err());

        voice.set_failure(None);
        assert!(voice.play().is_ok());
    }

    #[test]
    fn test_reported_bit_depth_override() {
        let voice = SimulatedVoice::new();
        let ids = filled_buffers(&voice, 1);
        voice.set_reported_bit_depth(Some(0));
        assert_eq!(voice.buffer_info(ids[0]).unwrap().bits, 0);
    }

    #[test]
    fn test_realtime_mode_drains_buffers() {
        let voice = SimulatedVoice::realtime();
        let ids = voice.create_buffers(1).unwrap();
        // 10 ms of mono audio at 8 kHz
        voice
            .buffer_data(ids[0], SampleFormat::pcm16(1), &[0u8; 160], 8_000)
            .unwrap();
        voice.queue_buffer(ids[0]).unwrap();
        voice.play().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while voice.status().unwrap() == VoiceStatus::Playing && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(voice.status().unwrap(), VoiceStatus::Stopped);
        assert_eq!(voice.processed_count().unwrap(), 1);
    }
}
