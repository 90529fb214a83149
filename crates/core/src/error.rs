//! Error kinds shared by the scanner, the codec adapter and the synthesizer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    #[error("sample rate mismatch: {0} Hz vs {1} Hz")]
    SampleRateMismatch(u32, u32),
    #[error("cannot mix {found} channel(s) into a {expected} channel buffer")]
    ChannelMismatch { expected: u16, found: u16 },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("corrupt input: {0}")]
    Corrupt(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav writer: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("catalog tags column: {0}")]
    Tags(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MixError {
    #[error("no source files to mix from")]
    EmptySource,
    #[error("gave up after {attempts} consecutive decode failures (last: {last_error})")]
    DecodeRetriesExhausted { attempts: usize, last_error: String },
    #[error("mix cancelled")]
    Cancelled,
    #[error(transparent)]
    Audio(#[from] AudioError),
}
