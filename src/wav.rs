//! WAV loading
//!
//! Decodes 16-bit integer PCM WAV data into a [`MemoryStream`] using `hound`.

use crate::source::MemoryStream;
use crate::{Result, StreamError};
use std::io::Read;
use std::path::Path;

/// Load a 16-bit PCM WAV file
pub fn load_wav(path: impl AsRef<Path>) -> Result<MemoryStream> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .map_err(|e| StreamError::Decode(format!("{}: {}", path.display(), e)))?;
    decode(reader)
}

/// Decode 16-bit PCM WAV data from any reader
pub fn from_reader<R: Read>(reader: R) -> Result<MemoryStream> {
    let reader = hound::WavReader::new(reader).map_err(|e| StreamError::Decode(e.to_string()))?;
    decode(reader)
}

fn decode<R: Read>(reader: hound::WavReader<R>) -> Result<MemoryStream> {
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(StreamError::Decode(format!(
            "unsupported sample format {:?} with {} bits (16-bit integer PCM required)",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| StreamError::Decode(e.to_string()))?;

    log::debug!(
        "Decoded WAV: {} samples, {} channels @ {} Hz",
        samples.len(),
        spec.channels,
        spec.sample_rate
    );
    Ok(MemoryStream::new(
        samples,
        u32::from(spec.channels),
        spec.sample_rate,
    ))
}
