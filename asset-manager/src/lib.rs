//! Decoder contract for the audio system's clip store: open a file, pull
//! fixed-size blocks of interleaved PCM out of it, seek when the stream
//! supports it.

pub mod decoder;
pub mod util;

pub use decoder::{DecodeOutcome, Decoder, SymphoniaDecoder};
pub use util::{AssetError, CACHED_MAX_BYTES, ENGINE_CHANNELS, ENGINE_SAMPLE_RATE, ON_DEMAND_BUFFER_BYTES};
