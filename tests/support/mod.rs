//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use soundstream::{Chunk, EngineConfig, MemoryStream, SimulatedVoice, StreamEngine, StreamSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for any wait on the production thread
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Engine configuration with a 1 ms wake-up period
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        processing_interval_ms: 1,
        ..EngineConfig::default()
    }
}

/// Poll `condition` every millisecond until it holds or [`TIMEOUT`] expires
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Mono 8 kHz ramp of `len` samples
pub fn mono_stream(len: usize, chunk_len: usize) -> MemoryStream {
    let samples: Vec<i16> = (0..len).map(|i| (i % 1_000) as i16).collect();
    MemoryStream::new(samples, 1, 8_000).with_chunk_len(chunk_len)
}

/// Initialized engine on a manual simulated voice
pub fn engine_with(voice: &Arc<SimulatedVoice>, source: impl StreamSource + 'static) -> StreamEngine {
    let engine = StreamEngine::with_config(voice.clone(), Box::new(source), fast_config())
        .expect("valid config");
    engine.initialize(1, 8_000).expect("mono layout is supported");
    engine
}

/// Wait until the production thread has filled the whole pool and started the voice
pub fn wait_primed(voice: &SimulatedVoice, buffers: usize) -> bool {
    wait_until(|| {
        voice.queued_len() == buffers && voice.raw_state() == soundstream::VoiceStatus::Playing
    })
}

/// Call counters shared with a test
#[derive(Clone, Default)]
pub struct Calls {
    pub get_data: Arc<AtomicUsize>,
    pub on_loop: Arc<AtomicUsize>,
    pub on_seek: Arc<AtomicUsize>,
}

impl Calls {
    pub fn get_data(&self) -> usize {
        self.get_data.load(Ordering::SeqCst)
    }

    pub fn on_loop(&self) -> usize {
        self.on_loop.load(Ordering::SeqCst)
    }

    pub fn on_seek(&self) -> usize {
        self.on_seek.load(Ordering::SeqCst)
    }
}

/// Source that never produces anything
pub struct StarvingSource {
    pub calls: Calls,
}

impl StreamSource for StarvingSource {
    fn on_get_data(&mut self, _chunk: &mut Chunk) -> bool {
        self.calls.get_data.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn on_seek(&mut self, _offset: Duration) {
        self.calls.on_seek.fetch_add(1, Ordering::SeqCst);
    }

    fn on_loop(&mut self) -> Option<u64> {
        self.calls.on_loop.fetch_add(1, Ordering::SeqCst);
        Some(0)
    }
}

/// Wraps a source, counting calls and running a hook before each data request
pub struct Instrumented<S> {
    pub inner: S,
    pub calls: Calls,
    pub hook: Option<Box<dyn FnMut() + Send>>,
}

impl<S: StreamSource> Instrumented<S> {
    pub fn new(inner: S) -> Self {
        Instrumented {
            inner,
            calls: Calls::default(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }
}

impl<S: StreamSource> StreamSource for Instrumented<S> {
    fn on_get_data(&mut self, chunk: &mut Chunk) -> bool {
        self.calls.get_data.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.as_mut() {
            hook();
        }
        self.inner.on_get_data(chunk)
    }

    fn on_seek(&mut self, offset: Duration) {
        self.calls.on_seek.fetch_add(1, Ordering::SeqCst);
        self.inner.on_seek(offset)
    }

    fn on_loop(&mut self) -> Option<u64> {
        self.calls.on_loop.fetch_add(1, Ordering::SeqCst);
        self.inner.on_loop()
    }

    fn on_looping_changed(&mut self, looping: bool) {
        self.inner.on_looping_changed(looping)
    }
}
