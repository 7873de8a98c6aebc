//! Production thread body
//!
//! One [`Worker`] runs per `play()` cycle. It owns the buffer pool and the
//! loop-adjusted sample counter while alive, and hands both back (released
//! and reset) when it exits.

use super::{BufferPool, EngineConfig, Shared, Signal, StreamState};
use crate::source::{Chunk, StreamSource};
use crate::voice::{PlaybackVoice, SampleFormat, VoiceError, VoiceStatus};
use crate::{Result, StreamError};
use parking_lot::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;

/// Source shared between the engine and its production thread
pub(crate) type SharedSource = Arc<Mutex<Box<dyn StreamSource>>>;

/// Stream layout fixed for one production cycle
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub config: EngineConfig,
}

pub(crate) struct Worker {
    voice: Arc<dyn PlaybackVoice>,
    source: SharedSource,
    shared: Arc<Shared>,
    signals: Receiver<Signal>,
    layout: Layout,
    pool: BufferPool,
    chunk: Chunk,
    /// Local copy of the published sample counter
    samples: u64,
    intent: StreamState,
    stop_signaled: bool,
    /// Looping flag last delivered to the source
    seen_looping: Option<bool>,
}

impl Worker {
    pub fn new(
        voice: Arc<dyn PlaybackVoice>,
        source: SharedSource,
        shared: Arc<Shared>,
        signals: Receiver<Signal>,
        layout: Layout,
        intent: StreamState,
    ) -> Self {
        let samples = shared.samples();
        Worker {
            voice,
            source,
            shared,
            signals,
            layout,
            pool: BufferPool::new(),
            chunk: Chunk::new(),
            samples,
            intent,
            stop_signaled: false,
            seen_looping: None,
        }
    }

    /// Thread entry point
    pub fn run(mut self) {
        *self.shared.worker_thread.lock() = Some(std::thread::current().id());

        // stop() may have been called before this thread got scheduled
        self.drain_signals();
        if self.stop_signaled || self.intent == StreamState::Stopped {
            log::debug!("Production thread launched stopped, exiting");
            self.shared.control.lock().streaming = false;
            return;
        }

        log::debug!(
            "Production thread started ({} buffers, {:?} interval)",
            self.layout.config.buffer_count,
            self.shared.interval()
        );

        let streamed = self.stream();
        let torn_down = self.teardown();
        if let Err(err) = streamed.and(torn_down) {
            self.shared.record_error(err);
        }

        self.shared.control.lock().streaming = false;
        log::debug!("Production thread finished");
    }

    fn stream(&mut self) -> Result<()> {
        self.pool
            .acquire(&*self.voice, self.layout.config.buffer_count)?;

        let mut requested_stop = self.fill_queue()?;

        {
            // pause() may land between these two calls otherwise
            let control = self.shared.control.lock();
            self.voice.play()?;
            if control.intent == StreamState::Paused {
                self.voice.pause()?;
            }
        }

        loop {
            self.drain_signals();
            if self.stop_signaled {
                return Ok(());
            }

            let mut ending = false;
            if self.voice.status()? == VoiceStatus::Stopped {
                if requested_stop {
                    self.shared.control.lock().streaming = false;
                    ending = true;
                } else {
                    // A paused stream stays idle until play() resumes it
                    let control = self.shared.control.lock();
                    if control.intent == StreamState::Playing {
                        log::warn!("Audio stream underrun, restarting voice");
                        self.voice.play()?;
                    }
                }
            }

            let processed = self.voice.processed_count()?;
            for _ in 0..processed {
                let buffer = self.voice.unqueue_buffer()?;
                let slot = self
                    .pool
                    .slot_of(buffer)
                    .ok_or(VoiceError::UnknownBuffer(buffer))?;

                match self.pool.take_marker(slot) {
                    Some(marker) => {
                        // Last buffer before a loop wrap or the end of the stream
                        log::trace!("Buffer {buffer} drained, position reset to {marker}");
                        self.set_samples(marker);
                    }
                    None => {
                        let info = self.voice.buffer_info(buffer)?;
                        let count = info.sample_count().ok_or(StreamError::ZeroBitDepth)?;
                        self.set_samples(self.samples + count);
                    }
                }

                if !requested_stop {
                    requested_stop = self.fill_and_push(slot, false)?;
                }
            }

            if ending {
                log::debug!("Audio stream reached its end");
                return Ok(());
            }

            if self.voice.status()? != VoiceStatus::Stopped || !self.wants_playback() {
                self.wait();
            }
        }
    }

    /// Fill every slot in order, stopping early once the source runs dry
    ///
    /// Nothing has played yet, so a loop marker produced for slot 0 is
    /// applied to the counter right away.
    pub fn fill_queue(&mut self) -> Result<bool> {
        for slot in 0..self.pool.len() {
            if self.fill_and_push(slot, slot == 0)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Pull one chunk into `slot` and queue it
    ///
    /// Returns true when the stream should stop once this buffer drains.
    pub fn fill_and_push(&mut self, slot: usize, immediate_loop: bool) -> Result<bool> {
        let mut requested_stop = false;
        self.chunk.clear();

        let source = Arc::clone(&self.source);
        let mut source = source.lock();
        let looping = self.shared.is_looping();
        if self.seen_looping != Some(looping) {
            source.on_looping_changed(looping);
            self.seen_looping = Some(looping);
        }

        let mut retry = 0;
        while !source.on_get_data(&mut self.chunk) && retry < self.layout.config.retry_count {
            if !looping {
                if !self.chunk.is_empty() {
                    self.pool.set_marker(slot, Some(0));
                }
                requested_stop = true;
                break;
            }

            let marker = source.on_loop();
            log::trace!("Loop boundary in slot {slot}, marker {marker:?}");
            self.pool.set_marker(slot, marker);

            if !self.chunk.is_empty() {
                break;
            }

            // Preloading started right at the loop end
            if immediate_loop {
                if let Some(marker) = self.pool.take_marker(slot) {
                    self.set_samples(marker);
                }
            }

            retry += 1;
        }
        drop(source);

        if self.chunk.is_empty() {
            // Retries exhausted or the source is genuinely empty
            return Ok(true);
        }

        let buffer = self
            .pool
            .buffer(slot)
            .ok_or_else(|| StreamError::InvalidConfig(format!("no buffer in slot {slot}")))?;
        self.voice.buffer_data(
            buffer,
            self.layout.format,
            &self.chunk.samples,
            self.layout.sample_rate,
        )?;
        self.voice.queue_buffer(buffer)?;

        Ok(requested_stop)
    }

    /// Stop the voice, drop whatever is still queued and give the buffers back
    ///
    /// Runs every step even if one fails; the first failure is returned.
    fn teardown(&mut self) -> Result<()> {
        let mut first: Result<()> = Ok(());
        let mut keep = |result: std::result::Result<(), VoiceError>| {
            if let Err(err) = result {
                if first.is_ok() {
                    first = Err(err.into());
                }
            }
        };

        keep(self.voice.stop());
        match self.voice.queued_count() {
            Ok(queued) => {
                for _ in 0..queued {
                    if let Err(err) = self.voice.unqueue_buffer() {
                        keep(Err(err));
                        break;
                    }
                }
            }
            Err(err) => keep(Err(err)),
        }

        self.set_samples(0);
        keep(self.pool.release(&*self.voice));
        first
    }

    fn wants_playback(&self) -> bool {
        self.shared.control.lock().intent == StreamState::Playing
    }

    fn set_samples(&mut self, samples: u64) {
        self.samples = samples;
        self.shared.set_samples(samples);
    }

    fn apply(&mut self, signal: Signal) {
        match signal {
            Signal::Stop => self.stop_signaled = true,
            Signal::Intent(intent) => self.intent = intent,
        }
    }

    fn drain_signals(&mut self) {
        loop {
            match self.signals.try_recv() {
                Ok(signal) => self.apply(signal),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.stop_signaled = true;
                    return;
                }
            }
        }
    }

    /// Sleep for the processing interval, waking early on a signal
    fn wait(&mut self) {
        match self.signals.recv_timeout(self.shared.interval()) {
            Ok(signal) => self.apply(signal),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.stop_signaled = true,
        }
    }
}
