use thiserror::Error;

/// The mixer's native rate. The decoder never resamples; it hands back
/// whatever rate the source stream carries, at this many frequency.
pub const ENGINE_SAMPLE_RATE: u32 = 44_100;
pub const ENGINE_CHANNELS: u16 = 2;

/// One decode block, in bytes of interleaved 16-bit PCM. A load that fills
/// two of these without reaching EOF is kept on-demand; one that reaches EOF
/// first is cached in full.
pub const ON_DEMAND_BUFFER_BYTES: usize = 131_072;
pub const CACHED_MAX_BYTES: usize = ON_DEMAND_BUFFER_BYTES * 2;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("decoder cannot seek this stream")]
    CantSeek,
    #[error("seek failed: {0}")]
    Seek(String),
}
