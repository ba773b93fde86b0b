use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::{AudioBackend, BackendError, DeviceInfo, DeviceInfoProvider, DiagnosticsCb, RenderFn, CHANNELS, FRAMES_PER_CALLBACK, SAMPLE_RATE};

/// Test-only backend: holds the render function but never calls it on its
/// own; tests call `drive` to pump frames, matching how a real driver would
/// invoke the callback.
pub struct MockAudioBackend {
    info: DeviceInfo,
    render: Mutex<Option<RenderFn>>,
    frames: AtomicU64,
    diagnostics: Option<DiagnosticsCb>,
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self {
            info: DeviceInfo {
                sample_rate: SAMPLE_RATE,
                buffer_size: FRAMES_PER_CALLBACK,
                channels: CHANNELS,
                device_name: Some("mock-device".to_string()),
            },
            render: Mutex::new(None),
            frames: AtomicU64::new(0),
            diagnostics: None,
        }
    }

    /// Invokes the stored render function once, as the driver thread would,
    /// and advances the frame counter. No-op if no render is set.
    pub fn drive(&self, out: &mut [i16]) {
        if let Some(render) = self.render.lock().unwrap().as_ref() {
            render(out);
            self.frames.fetch_add((out.len() / self.info.channels as usize) as u64, Ordering::Relaxed);
        }
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        *self.render.lock().unwrap() = Some(render);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        *self.render.lock().unwrap() = None;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.info.buffer_size
    }

    fn channels(&self) -> u16 {
        self.info.channels
    }

    fn frames_since_start(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.diagnostics = cb;
    }

    fn as_device_info_provider(&self) -> Option<&dyn DeviceInfoProvider> {
        Some(self)
    }
}

impl DeviceInfoProvider for MockAudioBackend {
    fn get_device_name(&self) -> Option<&str> {
        self.info.device_name.as_deref()
    }
}
