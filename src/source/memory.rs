//! Memory-backed streaming source

use super::{Chunk, LoopSpan, StreamSource};
use crate::time::SampleClock;
use crate::{Result, StreamError};
use std::sync::Arc;
use std::time::Duration;

/// Interleaved 16-bit PCM held in memory and streamed in fixed-size chunks
///
/// The loop span covers the whole stream unless narrowed with
/// [`with_loop_span`](Self::with_loop_span). While looping, chunks are cut
/// at the loop end so the engine sees the boundary and asks
/// [`on_loop`](StreamSource::on_loop) where to continue.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    samples: Arc<[i16]>,
    clock: SampleClock,
    span: LoopSpan,
    chunk_len: usize,
    offset: u64,
    looping: bool,
}

impl MemoryStream {
    /// Wrap interleaved samples
    ///
    /// Chunks default to one second of audio.
    pub fn new(samples: impl Into<Arc<[i16]>>, channel_count: u32, sample_rate: u32) -> Self {
        let samples = samples.into();
        let clock = SampleClock::new(sample_rate, channel_count);
        let chunk_len = usize::try_from(clock.samples_per_second())
            .unwrap_or(usize::MAX)
            .max(1);
        let span = LoopSpan::new(0, samples.len() as u64);

        MemoryStream {
            samples,
            clock,
            span,
            chunk_len,
            offset: 0,
            looping: false,
        }
    }

    /// Use chunks of `samples` interleaved samples (at least one)
    pub fn with_chunk_len(mut self, samples: usize) -> Self {
        self.chunk_len = samples.max(1);
        self
    }

    /// Restrict looping to `span`
    ///
    /// The span must start inside the data and be non-empty; an end past
    /// the data is clamped.
    pub fn with_loop_span(mut self, span: LoopSpan) -> Result<Self> {
        let total = self.len();
        if span.length == 0 {
            return Err(StreamError::InvalidConfig("loop span is empty".into()));
        }
        if span.offset >= total {
            return Err(StreamError::InvalidConfig(format!(
                "loop start {} is past the end of the data ({} samples)",
                span.offset, total
            )));
        }

        let length = span.length.min(total - span.offset);
        if length != span.length {
            log::warn!(
                "Loop span clamped from {} to {} samples",
                span.length,
                length
            );
        }
        self.span = LoopSpan::new(span.offset, length);
        Ok(self)
    }

    /// Restrict looping to a time range, aligned down to whole frames
    pub fn with_loop_points(self, start: Duration, length: Duration) -> Result<Self> {
        let offset = self.align(self.clock.to_samples(start));
        let length = self.align(self.clock.to_samples(length));
        self.with_loop_span(LoopSpan::new(offset, length))
    }

    /// Number of interleaved samples
    pub fn len(&self) -> u64 {
        self.samples.len() as u64
    }

    /// True when the stream holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Channels per frame
    pub fn channel_count(&self) -> u32 {
        self.clock.channel_count()
    }

    /// Frames per second
    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    /// Total playback time
    pub fn duration(&self) -> Duration {
        self.clock.to_time(self.len())
    }

    /// Current loop span
    pub fn loop_span(&self) -> LoopSpan {
        self.span
    }

    /// Read cursor in interleaved samples
    pub fn position(&self) -> u64 {
        self.offset
    }

    fn align(&self, samples: u64) -> u64 {
        let channels = u64::from(self.clock.channel_count().max(1));
        samples - samples % channels
    }

    fn cuts_at_loop_end(&self) -> bool {
        self.looping && self.span.length != 0
    }
}

impl StreamSource for MemoryStream {
    fn on_get_data(&mut self, chunk: &mut Chunk) -> bool {
        let total = self.len();
        let start = self.offset.min(total);
        let mut end = start.saturating_add(self.chunk_len as u64).min(total);
        // A cursor sitting on the loop end yields an empty chunk
        if self.cuts_at_loop_end() && start <= self.span.end() && end > self.span.end() {
            end = self.span.end();
        }

        // Bounded by `total`, which came from a slice length
        chunk.extend_from_i16(&self.samples[start as usize..end as usize]);
        self.offset = end;

        let at_loop_end = self.cuts_at_loop_end() && end == self.span.end();
        !chunk.is_empty() && end < total && !at_loop_end
    }

    fn on_seek(&mut self, offset: Duration) {
        let target = self.align(self.clock.to_samples(offset));
        self.offset = target.min(self.len());
    }

    fn on_loop(&mut self) -> Option<u64> {
        if !self.looping {
            return None;
        }

        if self.span.length != 0 && self.offset == self.span.end() {
            self.offset = self.span.offset;
            Some(self.span.offset)
        } else if self.offset >= self.len() {
            self.offset = 0;
            Some(0)
        } else {
            None
        }
    }

    fn on_looping_changed(&mut self, looping: bool) {
        self.looping = looping;
    }
}
