// Audio ingestion
// Reads WAV recordings into float sample streams for extraction

use hound::{SampleFormat, WavReader, WavSpec};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

use crate::samples::Stream;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV data has no channels")]
    NoChannels,
}

pub type AudioResult<T> = Result<T, AudioError>;

/// Read a WAV file into a float stream with one dimension per channel
pub fn read_wav_file(path: impl AsRef<Path>) -> AudioResult<Stream> {
    let reader = WavReader::open(path.as_ref())?;
    log::debug!("reading WAV file '{}'", path.as_ref().display());
    read_samples(reader)
}

/// Read WAV bytes into a float stream with one dimension per channel
pub fn read_wav_bytes(data: &[u8]) -> AudioResult<Stream> {
    read_samples(WavReader::new(Cursor::new(data))?)
}

fn read_samples<R: Read>(mut reader: WavReader<R>) -> AudioResult<Stream> {
    let WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    } = reader.spec();

    if channels == 0 {
        return Err(AudioError::NoChannels);
    }

    // Integer PCM is scaled to [-1.0, 1.0]
    let values: Vec<f32> = match (sample_format, bits_per_sample) {
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                sample_format, bits_per_sample
            )));
        }
    };

    let stream = Stream::from_f32(&values, channels as usize, sample_rate as f64);
    log::debug!(
        "read {} frames with {} channels at {} Hz",
        stream.num,
        stream.dim,
        sample_rate
    );
    Ok(stream)
}
