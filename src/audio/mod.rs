// Audio module
// WAV recordings as sample streams

pub mod ingest;

pub use ingest::{read_wav_bytes, read_wav_file, AudioError, AudioResult};
