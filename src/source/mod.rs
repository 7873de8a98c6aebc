//! Pull-based audio sources
//!
//! A [`StreamSource`] hands the production thread one [`Chunk`] at a time
//! and answers seek and loop queries. The engine owns the source for its
//! whole life and only calls into it from one thread at a time.

pub mod memory;

pub use memory::MemoryStream;

use std::time::Duration;

/// One unit of sample bytes produced by a single `on_get_data` call
///
/// Samples are interleaved signed 16-bit little-endian PCM. An empty chunk
/// is a valid value meaning "nothing produced".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Raw sample bytes
    pub samples: Vec<u8>,
}

impl Chunk {
    /// Empty chunk
    pub fn new() -> Self {
        Chunk::default()
    }

    /// True when no bytes were produced
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Drop all bytes while keeping the allocation
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Append 16-bit samples as little-endian bytes
    pub fn extend_from_i16(&mut self, samples: &[i16]) {
        self.samples.reserve(samples.len() * 2);
        for sample in samples {
            self.samples.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

/// Looped region of a stream, in interleaved samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSpan {
    /// First sample of the loop
    pub offset: u64,
    /// Number of samples in the loop (0 means "no explicit loop end")
    pub length: u64,
}

impl LoopSpan {
    /// Span starting at `offset` covering `length` samples
    pub fn new(offset: u64, length: u64) -> Self {
        LoopSpan { offset, length }
    }

    /// One past the last sample of the loop
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Supplier of audio data for a [`StreamEngine`](crate::StreamEngine)
///
/// All callbacks run on the engine's production thread while streaming, or
/// on the caller's thread while the engine is stopped; never on both at
/// once.
///
/// Callbacks must return promptly. Stopping the engine waits for the
/// production thread, so a source that blocks forever inside
/// [`on_get_data`](Self::on_get_data) blocks `stop()` forever. Engine
/// mutators (`play`, `pause`, `stop`, seeking) called from inside a callback
/// fail with [`StreamError::CalledFromProducer`](crate::StreamError::CalledFromProducer).
pub trait StreamSource: Send {
    /// Produce the next chunk
    ///
    /// Either fill `chunk` with at least one sample and return `true`, or
    /// return `false` when no more data follows (end of stream or loop
    /// end). Data written before returning `false` is still played.
    /// `chunk` arrives empty.
    fn on_get_data(&mut self, chunk: &mut Chunk) -> bool;

    /// Move the read cursor to `offset` from the start of the stream
    fn on_seek(&mut self, offset: Duration);

    /// Called at a loop boundary while looping is enabled
    ///
    /// Repositions the read cursor and returns the sample offset playback
    /// continues from, or `None` if no loop applies at the current position.
    fn on_loop(&mut self) -> Option<u64> {
        self.on_seek(Duration::ZERO);
        Some(0)
    }

    /// Looping was switched on or off
    ///
    /// Delivered by the production thread before its next data request.
    fn on_looping_changed(&mut self, looping: bool) {
        let _ = looping;
    }
}

impl<S: StreamSource + ?Sized> StreamSource for Box<S> {
    fn on_get_data(&mut self, chunk: &mut Chunk) -> bool {
        (**self).on_get_data(chunk)
    }

    fn on_seek(&mut self, offset: Duration) {
        (**self).on_seek(offset)
    }

    fn on_loop(&mut self) -> Option<u64> {
        (**self).on_loop()
    }

    fn on_looping_changed(&mut self, looping: bool) {
        (**self).on_looping_changed(looping)
    }
}
