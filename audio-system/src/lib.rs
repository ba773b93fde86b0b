//! The streaming audio mixer: a clip registry, a background decoder worker,
//! a real-time mix step, and the per-layer state the mixer drains each
//! callback. Grounded throughout on `original_source/r_audio.c`/`r_audio.h`.

pub mod clip;
pub mod engine;
pub mod mixer;
pub mod state;
pub mod worker;

pub use clip::{BufferStatus, ClipData, ClipId, ClipInstance, ClipInstanceFlags, ClipManager, InstanceState, OnDemandShared};
pub use engine::AudioEngine;
pub use mixer::mix;
pub use state::AudioState;
pub use worker::{DecoderWorker, Task};
