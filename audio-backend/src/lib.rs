//! The audio driver boundary: a `RenderFn` the mixer fills every callback,
//! behind an `AudioBackend` trait so the core never depends on a concrete
//! driver. `cpal_backend` is the real output device; `mock_backend` is test
//! tooling that calls the render function from a thread the test drives.

use std::fmt;
use std::sync::Arc;

// The mock backend implementation lives in `src/mock_backend.rs`.
#[cfg(feature = "mock-audio")]
pub mod mock_backend;

// The real CPAL-backed implementation lives in `src/cpal_backend.rs`.
#[cfg(not(feature = "mock-audio"))]
pub mod cpal_backend;

/// The engine's fixed audio contract: 44,100 Hz, 16-bit signed native
/// endian, 2 channels interleaved LR, 2048 frames per callback.
pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
pub const FRAMES_PER_CALLBACK: usize = 2048;

#[derive(Debug)]
pub enum BackendError {
    DeviceNotFound,
    UnsupportedFormat(String),
    StreamCreationFailed,
    PlaybackError(String),
    Other(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::DeviceNotFound => write!(f, "no output device found"),
            BackendError::UnsupportedFormat(s) => write!(f, "unsupported format: {s}"),
            BackendError::StreamCreationFailed => write!(f, "stream creation failed"),
            BackendError::PlaybackError(s) => write!(f, "playback error: {s}"),
            BackendError::Other(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Called on the real-time audio thread to fill the output buffer. Buffer
/// length is always an exact multiple of `2 * FRAMES_PER_CALLBACK` samples.
/// Must be `Send + Sync` to cross onto the driver's callback thread.
pub type RenderFn = Arc<dyn Fn(&mut [i16]) + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub enum DiagnosticEvent {
    XRun { count: u32 },
    DeviceRemoved,
    BufferSizeChanged { frames: usize },
    Other(String),
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::XRun { count } => write!(f, "XRun(count={count})"),
            DiagnosticEvent::DeviceRemoved => write!(f, "DeviceRemoved"),
            DiagnosticEvent::BufferSizeChanged { frames } => write!(f, "BufferSizeChanged(frames={frames})"),
            DiagnosticEvent::Other(s) => write!(f, "Other({s})"),
        }
    }
}

/// Non-RT diagnostics callback type.
pub type DiagnosticsCb = Arc<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

pub struct DeviceInfo {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub channels: u16,
    pub device_name: Option<String>,
}

pub trait DeviceInfoProvider {
    fn get_device_name(&self) -> Option<&str>;
}

/// The core trait defining the audio backend's contract.
pub trait AudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn sample_rate(&self) -> u32;
    fn buffer_size(&self) -> usize;
    fn channels(&self) -> u16;
    /// Returns frames since stream start. 0 if not running.
    fn frames_since_start(&self) -> u64;
    /// Register or clear non-RT diagnostics callback.
    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>);
    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider>;
}

#[cfg(not(feature = "mock-audio"))]
pub fn create_audio_backend() -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = cpal_backend::CpalAudioBackend::new()?;
    tracing::info!(
        sample_rate = backend.sample_rate(),
        buffer_size = backend.buffer_size(),
        channels = backend.channels(),
        "created CPAL audio backend"
    );
    Ok(Box::new(backend))
}

/// Runtime helper to determine if the `mock-audio` feature was enabled at
/// compile time for this crate.
pub fn is_mock_backend_enabled() -> bool {
    cfg!(feature = "mock-audio")
}

#[cfg(feature = "mock-audio")]
pub fn create_audio_backend() -> Result<Box<dyn AudioBackend>, BackendError> {
    let backend = mock_backend::MockAudioBackend::new();
    tracing::info!(
        sample_rate = backend.sample_rate(),
        buffer_size = backend.buffer_size(),
        channels = backend.channels(),
        "created mock audio backend"
    );
    Ok(Box::new(backend))
}
