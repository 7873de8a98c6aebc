//! Sample-count / wall-clock conversion
//!
//! Positions inside a stream are counted in interleaved samples (one sample
//! per channel per frame). [`SampleClock`] converts those counts to
//! [`Duration`]s and back for offset reporting and loop-point math.

use std::time::Duration;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Converts between interleaved sample counts and playback time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleClock {
    /// Frames per second
    sample_rate: u32,
    /// Interleaved channels per frame
    channel_count: u32,
}

impl SampleClock {
    /// Create a clock for the given stream layout
    pub fn new(sample_rate: u32, channel_count: u32) -> Self {
        SampleClock {
            sample_rate,
            channel_count,
        }
    }

    /// Frames per second
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channels per frame
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// True when both the sample rate and the channel count are non-zero
    pub fn is_valid(&self) -> bool {
        self.sample_rate != 0 && self.channel_count != 0
    }

    /// Interleaved samples played per second of audio
    pub fn samples_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channel_count)
    }

    /// Convert an interleaved sample count to playback time
    ///
    /// Truncates to the nanosecond. A degenerate clock (zero rate or zero
    /// channels) always yields [`Duration::ZERO`].
    pub fn to_time(&self, samples: u64) -> Duration {
        let per_second = u128::from(self.samples_per_second());
        if per_second == 0 {
            return Duration::ZERO;
        }

        let nanos = u128::from(samples) * NANOS_PER_SECOND / per_second;
        duration_from_nanos(nanos)
    }

    /// Convert playback time to an interleaved sample count
    ///
    /// Rounds to the nearest sample so that `to_samples(to_time(s)) == s`
    /// for every realistic layout.
    pub fn to_samples(&self, time: Duration) -> u64 {
        let per_second = u128::from(self.samples_per_second());
        let Some(rounded) = time
            .as_nanos()
            .checked_mul(per_second)
            .and_then(|scaled| scaled.checked_add(NANOS_PER_SECOND / 2))
        else {
            return u64::MAX;
        };
        u64::try_from(rounded / NANOS_PER_SECOND).unwrap_or(u64::MAX)
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = nanos / NANOS_PER_SECOND;
    let subsec = (nanos % NANOS_PER_SECOND) as u32;
    Duration::new(u64::try_from(secs).unwrap_or(u64::MAX), subsec)
}
