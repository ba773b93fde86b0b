//! The engine-lifetime audio handle: owns the clip registry, the decoder
//! worker, and the audio driver, and produces the `RenderFn` the driver
//! calls back on its own thread. Grounded on `original_source/r_audio.h`'s
//! process-wide audio manager and `done` flag, collapsed per
//! `DESIGN NOTES` into a single handle constructed at `start` and dropped
//! at `end`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use audio_backend::{AudioBackend, BackendError, RenderFn};
use engine_core::EngineError;
use parking_lot::Mutex;

use crate::clip::ClipManager;
use crate::mixer;
use crate::state::AudioState;
use crate::worker::DecoderWorker;

/// Owns everything the audio subsystem needs for the lifetime of a session:
/// the clip registry, the decoder worker, the driver, and a pointer to
/// whichever layer's `AudioState` is currently active. One instance per
/// running engine; re-`start`ing one already running is a logic error.
pub struct AudioEngine {
    clip_manager: Arc<ClipManager>,
    worker: Arc<DecoderWorker>,
    backend: Mutex<Box<dyn AudioBackend>>,
    active: Arc<Mutex<Option<Arc<Mutex<AudioState>>>>>,
    global_volume: Arc<AtomicU8>,
    running: AtomicBool,
}

impl AudioEngine {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            clip_manager: Arc::new(ClipManager::new()),
            worker: Arc::new(DecoderWorker::spawn()),
            backend: Mutex::new(backend),
            active: Arc::new(Mutex::new(None)),
            global_volume: Arc::new(AtomicU8::new(255)),
            running: AtomicBool::new(false),
        }
    }

    pub fn clip_manager(&self) -> &Arc<ClipManager> {
        &self.clip_manager
    }

    pub fn worker(&self) -> &Arc<DecoderWorker> {
        &self.worker
    }

    /// Swaps which layer's audio state the mixer reads. Called once per
    /// scripted tick by the host as it pushes/pops layers.
    pub fn set_active(&self, state: Option<Arc<Mutex<AudioState>>>) {
        *self.active.lock() = state;
    }

    pub fn set_global_volume(&self, volume: u8) {
        self.global_volume.store(volume, Ordering::Relaxed);
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume.load(Ordering::Relaxed)
    }

    /// Builds the render closure and hands it to the backend. Fails with
    /// `InvalidOperation` if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(EngineError::InvalidOperation("audio engine already running".to_string()));
        }
        let render = self.build_render_fn();
        self.backend.lock().start(render).map_err(backend_error_to_engine_error)?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.backend.lock().stop().map_err(backend_error_to_engine_error)
    }

    pub(crate) fn build_render_fn(&self) -> RenderFn {
        let active = self.active.clone();
        let global_volume = self.global_volume.clone();
        let worker = self.worker.clone();
        let clip_manager = self.clip_manager.clone();

        Arc::new(move |out: &mut [i16]| {
            out.fill(0);
            let gv = global_volume.load(Ordering::Relaxed) as i32;
            if gv == 0 {
                return;
            }
            let active_guard = active.lock();
            let Some(state_arc) = active_guard.as_ref() else { return };
            let mut state = state_arc.lock();
            if state.instance_count() == 0 {
                return;
            }
            mixer::mix(state.instances_mut(), gv, &worker, out);
            state.reap_finished(&clip_manager);
        })
    }
}

fn backend_error_to_engine_error(err: BackendError) -> EngineError {
    EngineError::InvalidOperation(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_backend::mock_backend::MockAudioBackend;
    use std::path::PathBuf;

    fn write_test_wav(path: &std::path::Path, samples: &[i16]) {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        let data_bytes = (samples.len() * 2) as u32;
        data.extend_from_slice(&(36 + data_bytes).to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&44_100u32.to_le_bytes());
        data.extend_from_slice(&(44_100 * 2 * 2).to_le_bytes());
        data.extend_from_slice(&4u16.to_le_bytes());
        data.extend_from_slice(&16u16.to_le_bytes());
        data.extend_from_slice(b"data");
        data.extend_from_slice(&data_bytes.to_le_bytes());
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn start_twice_is_an_invalid_operation() {
        let engine = AudioEngine::new(Box::new(MockAudioBackend::new()));
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::InvalidOperation(_))));
        engine.stop().unwrap();
    }

    #[test]
    fn silence_when_nothing_active() {
        let engine = AudioEngine::new(Box::new(MockAudioBackend::new()));
        let render = engine.build_render_fn();
        let mut out = [7i16; 8];
        render(&mut out);
        assert_eq!(out, [0i16; 8]);
    }

    #[test]
    fn silence_when_global_volume_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beep.wav");
        write_test_wav(&path, &[1000, -1000, 2000, -2000]);

        let engine = AudioEngine::new(Box::new(MockAudioBackend::new()));
        let clip_id = engine.clip_manager().load(PathBuf::from(&path)).unwrap();
        let mut state = AudioState::new();
        state.queue_clip(engine.clip_manager(), engine.worker(), clip_id, 255, 0).unwrap();
        engine.set_active(Some(Arc::new(Mutex::new(state))));
        engine.set_global_volume(0);

        let render = engine.build_render_fn();
        let mut out = [1i16; 4];
        render(&mut out);
        assert_eq!(out, [0i16; 4]);
    }

    #[test]
    fn cached_clip_mixes_and_is_reaped_through_the_render_fn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beep.wav");
        write_test_wav(&path, &[1000, -1000, 2000, -2000]);

        let engine = AudioEngine::new(Box::new(MockAudioBackend::new()));
        let clip_id = engine.clip_manager().load(PathBuf::from(&path)).unwrap();
        let mut state = AudioState::new();
        state.queue_clip(engine.clip_manager(), engine.worker(), clip_id, 255, 0).unwrap();
        let state = Arc::new(Mutex::new(state));
        engine.set_active(Some(state.clone()));

        let render = engine.build_render_fn();
        let mut out = [0i16; 4];
        render(&mut out);

        assert!(out.iter().any(|&s| s != 0));
        assert_eq!(state.lock().instance_count(), 0, "non-looping clip is reaped once it ends");
    }
}
