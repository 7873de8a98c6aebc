//! Caller-facing streaming engine

use super::worker::{Layout, SharedSource, Worker};
use super::{EngineConfig, Shared, Signal, StreamState};
use crate::source::StreamSource;
use crate::time::SampleClock;
use crate::voice::{PlaybackVoice, SampleFormat, VoiceParams, VoiceStatus};
use crate::{ErrorKind, Result, StreamError};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Name given to production threads
const PRODUCER_THREAD_NAME: &str = "soundstream-producer";

/// Caller-side bookkeeping, serialized across engine operations
struct Lifecycle {
    format: Option<SampleFormat>,
    /// Why the last `initialize()` failed
    init_error: Option<StreamError>,
    config: EngineConfig,
    params: VoiceParams,
    handle: Option<JoinHandle<()>>,
    signals: Option<Sender<Signal>>,
}

/// Streams a [`StreamSource`] into a [`PlaybackVoice`]
///
/// Every operation takes `&self`; the engine can be shared behind an `Arc`.
/// Concurrent calls from several threads are serialized internally.
///
/// At most one production thread is alive per engine. `stop()` and `Drop`
/// wait for it to finish, so the source and the voice are never used after
/// either returns.
///
/// # Example
/// ```
/// use soundstream::{MemoryStream, SimulatedVoice, StreamEngine, StreamState};
/// use std::sync::Arc;
///
/// let voice = Arc::new(SimulatedVoice::new());
/// let source = MemoryStream::new(vec![0i16; 4_000], 1, 8_000).with_chunk_len(1_000);
/// let engine = StreamEngine::new(voice.clone(), Box::new(source));
///
/// engine.initialize(1, 8_000).unwrap();
/// engine.play().unwrap();
/// assert_ne!(engine.get_status().unwrap(), StreamState::Stopped);
/// engine.stop().unwrap();
/// assert_eq!(engine.get_status().unwrap(), StreamState::Stopped);
/// ```
pub struct StreamEngine {
    voice: Arc<dyn PlaybackVoice>,
    source: SharedSource,
    shared: Arc<Shared>,
    clock: Mutex<SampleClock>,
    lifecycle: Mutex<Lifecycle>,
}

impl StreamEngine {
    /// Create an engine with the default configuration
    pub fn new(voice: Arc<dyn PlaybackVoice>, source: Box<dyn StreamSource>) -> Self {
        Self::build(voice, source, EngineConfig::default())
    }

    /// Create an engine with a custom configuration
    pub fn with_config(
        voice: Arc<dyn PlaybackVoice>,
        source: Box<dyn StreamSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(voice, source, config))
    }

    fn build(
        voice: Arc<dyn PlaybackVoice>,
        source: Box<dyn StreamSource>,
        config: EngineConfig,
    ) -> Self {
        StreamEngine {
            voice,
            source: Arc::new(Mutex::new(source)),
            shared: Arc::new(Shared::new(config.processing_interval())),
            clock: Mutex::new(SampleClock::default()),
            lifecycle: Mutex::new(Lifecycle {
                format: None,
                init_error: None,
                config,
                params: VoiceParams::default(),
                handle: None,
                signals: None,
            }),
        }
    }

    /// Set the stream layout
    ///
    /// Resolves the voice format for `channel_count`. On failure the layout
    /// is zeroed and `play()` reports the same error until a later call
    /// succeeds. Resets the playback position.
    pub fn initialize(&self, channel_count: u32, sample_rate: u32) -> Result<()> {
        self.ensure_caller()?;
        let mut life = self.lifecycle.lock();
        if self.shared.is_streaming() {
            return Err(StreamError::StreamingActive);
        }
        // A thread that ended on its own still has to be joined
        self.join_worker(&mut life)?;

        *self.shared.error.lock() = None;
        self.shared.set_samples(0);

        let resolved = match self.voice.resolve_format(channel_count) {
            Some(_) if sample_rate == 0 => Err(StreamError::InvalidSampleRate),
            Some(format) => Ok(format),
            None => Err(StreamError::UnsupportedChannelCount(channel_count)),
        };

        match resolved {
            Ok(format) => {
                life.format = Some(format);
                life.init_error = None;
                *self.clock.lock() = SampleClock::new(sample_rate, channel_count);
                log::debug!("Audio stream initialized: {channel_count} channels @ {sample_rate} Hz");
                Ok(())
            }
            Err(err) => {
                log::error!("{err}");
                life.format = None;
                life.init_error = Some(err.clone());
                *self.clock.lock() = SampleClock::default();
                Err(err)
            }
        }
    }

    /// Start, resume or restart playback
    ///
    /// - paused: resume in place on the same production thread
    /// - playing: restart from the top
    /// - stopped: launch a new production thread
    pub fn play(&self) -> Result<()> {
        self.ensure_caller()?;
        let mut life = self.lifecycle.lock();

        let Some(format) = life.format else {
            let err = life
                .init_error
                .clone()
                .unwrap_or(StreamError::NotInitialized);
            log::error!("Failed to play audio stream: {err}");
            return Err(err);
        };
        if let Some(err) = self.blocking_error() {
            log::error!("Failed to play audio stream: {err}");
            return Err(err);
        }

        let control = *self.shared.control.lock();
        match (control.streaming, control.intent) {
            (true, StreamState::Paused) => {
                // Held across voice.play(); the production thread restarts
                // the voice under the same lock
                let mut control = self.shared.control.lock();
                control.intent = StreamState::Playing;
                Self::signal(&life, Signal::Intent(StreamState::Playing));
                self.voice.play()?;
                return Ok(());
            }
            (true, _) => self.stop_locked(&mut life)?,
            (false, _) if life.handle.is_some() => self.stop_locked(&mut life)?,
            (false, _) => {}
        }

        self.launch(&mut life, format, StreamState::Playing)
    }

    /// Pause in place
    ///
    /// Does nothing unless a production thread is running.
    pub fn pause(&self) -> Result<()> {
        self.ensure_caller()?;
        let life = self.lifecycle.lock();
        let mut control = self.shared.control.lock();
        if !control.streaming {
            return Ok(());
        }
        control.intent = StreamState::Paused;
        Self::signal(&life, Signal::Intent(StreamState::Paused));
        self.voice.pause()?;
        Ok(())
    }

    /// Stop playback and rewind the source
    ///
    /// Waits for the production thread to exit. Safe to call in any state
    /// and any number of times.
    pub fn stop(&self) -> Result<()> {
        self.ensure_caller()?;
        let mut life = self.lifecycle.lock();
        self.stop_locked(&mut life)
    }

    /// Current playback state
    ///
    /// Reports the voice's status, except that a voice still reading
    /// Stopped while the production thread starts up is reported in the
    /// state that was requested. Fails with the production thread's error
    /// if the current cycle aborted.
    pub fn get_status(&self) -> Result<StreamState> {
        if let Some(err) = self.shared.error.lock().clone() {
            return Err(err);
        }
        self.observed_state()
    }

    /// Jump to `offset` from the start of the stream
    ///
    /// Playback restarts in its previous state; a stopped stream stays
    /// stopped and starts from `offset` on the next `play()`.
    pub fn set_playing_offset(&self, offset: Duration) -> Result<()> {
        self.ensure_caller()?;
        let mut life = self.lifecycle.lock();
        let previous = self.observed_state()?;

        self.stop_locked(&mut life)?;
        self.source.lock().on_seek(offset);
        let clock = *self.clock.lock();
        self.shared.set_samples(clock.to_samples(offset));
        log::debug!("Audio stream seeked to {offset:?}");

        if previous == StreamState::Stopped {
            return Ok(());
        }
        let format = life.format.ok_or(StreamError::NotInitialized)?;
        self.launch(&mut life, format, previous)
    }

    /// Current playback position
    ///
    /// Zero until the engine has been initialized.
    pub fn get_playing_offset(&self) -> Result<Duration> {
        let clock = *self.clock.lock();
        if !clock.is_valid() {
            return Ok(Duration::ZERO);
        }
        let in_buffer = self.voice.elapsed()?;
        Ok(in_buffer + clock.to_time(self.shared.samples()))
    }

    /// Enable or disable looping
    ///
    /// Takes effect at the next loop boundary the production thread reaches.
    pub fn set_loop(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Release);
    }

    /// Whether looping is enabled
    pub fn get_loop(&self) -> bool {
        self.shared.is_looping()
    }

    /// Change how often the production thread wakes up to refill buffers
    ///
    /// Applies immediately, including to a running thread.
    pub fn set_processing_interval(&self, interval: Duration) -> Result<()> {
        self.ensure_caller()?;
        let mut life = self.lifecycle.lock();
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        life.config.processing_interval_ms = millis.max(1);
        self.shared.set_interval(interval);
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> EngineConfig {
        self.lifecycle.lock().config
    }

    /// Validate `params` and apply them to the voice
    pub fn set_voice_params(&self, params: VoiceParams) -> Result<()> {
        self.ensure_caller()?;
        params.validate()?;
        let mut life = self.lifecycle.lock();
        self.voice.apply_params(&params)?;
        life.params = params;
        Ok(())
    }

    /// Parameters last applied with [`set_voice_params`](Self::set_voice_params)
    pub fn voice_params(&self) -> VoiceParams {
        self.lifecycle.lock().params
    }

    /// Channels per frame (0 if not initialized)
    pub fn channel_count(&self) -> u32 {
        self.clock.lock().channel_count()
    }

    /// Frames per second (0 if not initialized)
    pub fn sample_rate(&self) -> u32 {
        self.clock.lock().sample_rate()
    }

    /// Interleaved samples played before the buffer currently playing
    pub fn samples_processed(&self) -> u64 {
        self.shared.samples()
    }

    /// True while a production thread is running
    pub fn is_streaming(&self) -> bool {
        self.shared.is_streaming()
    }

    /// Identity of the most recent production thread
    pub fn worker_thread_id(&self) -> Option<ThreadId> {
        *self.shared.worker_thread.lock()
    }

    /// Error that ended the current production cycle, if any
    pub fn last_error(&self) -> Option<StreamError> {
        self.shared.error.lock().clone()
    }

    fn observed_state(&self) -> Result<StreamState> {
        let status = self.voice.status()?;
        if status == VoiceStatus::Stopped {
            let control = self.shared.control.lock();
            if control.streaming {
                return Ok(control.intent);
            }
        }
        Ok(status.into())
    }

    /// Configuration errors from the production thread keep `play()` refused
    /// until the next `initialize()`
    fn blocking_error(&self) -> Option<StreamError> {
        self.shared
            .error
            .lock()
            .clone()
            .filter(|err| err.kind() == ErrorKind::Configuration)
    }

    fn ensure_caller(&self) -> Result<()> {
        if self.shared.is_worker_thread() {
            return Err(StreamError::CalledFromProducer);
        }
        Ok(())
    }

    fn signal(life: &Lifecycle, signal: Signal) {
        if let Some(signals) = &life.signals {
            // A finished thread has dropped its receiver
            let _ = signals.send(signal);
        }
    }

    fn stop_locked(&self, life: &mut Lifecycle) -> Result<()> {
        let joined = self.join_worker(life);
        self.source.lock().on_seek(Duration::ZERO);
        self.shared.set_samples(0);
        joined
    }

    /// Ask the production thread to exit and wait for it
    fn join_worker(&self, life: &mut Lifecycle) -> Result<()> {
        {
            let mut control = self.shared.control.lock();
            control.streaming = false;
            control.intent = StreamState::Stopped;
        }
        if let Some(signals) = life.signals.take() {
            let _ = signals.send(Signal::Stop);
        }

        let Some(handle) = life.handle.take() else {
            return Ok(());
        };
        if handle.join().is_err() {
            self.shared.record_error(StreamError::WorkerPanicked);
            return Err(StreamError::WorkerPanicked);
        }
        Ok(())
    }

    fn launch(&self, life: &mut Lifecycle, format: SampleFormat, intent: StreamState) -> Result<()> {
        *self.shared.error.lock() = None;
        {
            let mut control = self.shared.control.lock();
            control.streaming = true;
            control.intent = intent;
        }

        let (signals, receiver) = mpsc::channel();
        let layout = Layout {
            format,
            sample_rate: self.clock.lock().sample_rate(),
            config: life.config,
        };
        let worker = Worker::new(
            Arc::clone(&self.voice),
            Arc::clone(&self.source),
            Arc::clone(&self.shared),
            receiver,
            layout,
            intent,
        );

        let spawned = thread::Builder::new()
            .name(PRODUCER_THREAD_NAME.into())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                log::debug!("Launched production thread ({intent:?})");
                life.handle = Some(handle);
                life.signals = Some(signals);
                Ok(())
            }
            Err(err) => {
                self.shared.control.lock().streaming = false;
                let err = StreamError::ThreadSpawn(err.to_string());
                log::error!("{err}");
                Err(err)
            }
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if self.shared.is_worker_thread() {
            // Joining ourselves would deadlock; the thread exits on the
            // disconnected channel instead
            log::warn!("Audio stream dropped from its own production thread");
            self.shared.control.lock().streaming = false;
            let life = self.lifecycle.get_mut();
            life.signals.take();
            life.handle.take();
            return;
        }

        let mut life = self.lifecycle.lock();
        if let Err(err) = self.join_worker(&mut life) {
            log::error!("Audio stream shut down uncleanly: {err}");
        }
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("clock", &*self.clock.lock())
            .field("streaming", &self.is_streaming())
            .field("samples_processed", &self.samples_processed())
            .field("looping", &self.get_loop())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryStream;
    use crate::voice::SimulatedVoice;

    fn engine(voice: &Arc<SimulatedVoice>) -> StreamEngine {
        let source = MemoryStream::new(vec![0i16; 800], 1, 8_000).with_chunk_len(100);
        let config = EngineConfig {
            processing_interval_ms: 1,
            ..EngineConfig::default()
        };
        StreamEngine::with_config(voice.clone(), Box::new(source), config).unwrap()
    }

    #[test]
    fn test_with_config_validates() {
        let voice: Arc<dyn PlaybackVoice> = Arc::new(SimulatedVoice::new());
        let source = Box::new(MemoryStream::new(vec![0i16; 8], 1, 8_000));
        let config = EngineConfig {
            buffer_count: 0,
            ..EngineConfig::default()
        };
        assert!(StreamEngine::with_config(voice, source, config).is_err());
    }

    #[test]
    fn test_play_before_initialize_is_misuse() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        let err = engine.play().unwrap_err();
        assert_eq!(err, StreamError::NotInitialized);
        assert_eq!(err.kind(), ErrorKind::Misuse);
        assert!(!engine.is_streaming());
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        assert_eq!(
            engine.initialize(1, 0),
            Err(StreamError::InvalidSampleRate)
        );
        assert_eq!(engine.play(), Err(StreamError::InvalidSampleRate));
    }

    #[test]
    fn test_offset_is_zero_before_initialize() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        assert_eq!(engine.get_playing_offset().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_stop_before_play_is_harmless() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        engine.stop().unwrap();
        engine.stop().unwrap();
        assert_eq!(engine.get_status().unwrap(), StreamState::Stopped);
        assert_eq!(engine.worker_thread_id(), None);
    }

    #[test]
    fn test_voice_params_validated_and_forwarded() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        let params = VoiceParams {
            volume: 40.0,
            pitch: 1.5,
            ..VoiceParams::default()
        };
        engine.set_voice_params(params).unwrap();
        assert_eq!(voice.params(), params);
        assert_eq!(engine.voice_params(), params);

        let bad = VoiceParams {
            pitch: 0.0,
            ..VoiceParams::default()
        };
        assert!(engine.set_voice_params(bad).is_err());
        assert_eq!(voice.params(), params);
    }

    #[test]
    fn test_processing_interval_setter() {
        let voice = Arc::new(SimulatedVoice::new());
        let engine = engine(&voice);
        engine
            .set_processing_interval(Duration::from_millis(25))
            .unwrap();
        assert_eq!(engine.config().processing_interval_ms, 25);
        assert_eq!(engine.shared.interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_drop_joins_running_thread() {
        let voice = Arc::new(SimulatedVoice::new());
        {
            let engine = engine(&voice);
            engine.initialize(1, 8_000).unwrap();
            engine.play().unwrap();
        }
        // The thread tore down and released its buffers before drop returned
        assert_eq!(voice.live_buffers(), 0);
        assert_eq!(voice.queued_len(), 0);
    }
}
