//! Per-layer audio state: the instance list the mixer callback drains each
//! tick, plus the scripted operations (`queue_clip`, `music_play`, ...) that
//! mutate it from the script thread. Grounded on
//! `original_source/r_audio.h`'s `r_audio_state_t` and the
//! `r_audio_state_*` functions in `r_audio.c`, whose
//! `r_audio_clip_instance_ptr_list_t` is a flat list with direct
//! index-based removal — modeled here as a plain `Vec` rather than
//! `deferred_list::DeferredList`, since the mixer callback is the sole
//! reader/writer while it holds the audio lock and there is no concurrent
//! iteration to defer against.

use std::sync::Arc;

use engine_core::EngineError;
use parking_lot::Mutex;
use tracing::debug;

use crate::clip::{ClipData, ClipId, ClipInstance, ClipInstanceFlags, ClipManager, InstanceState, OnDemandShared, ON_DEMAND_BUFFERS};
use crate::worker::{DecoderWorker, Task};

/// One state's worth of active clip instances plus music bookkeeping. A
/// `Layer<Arc<Mutex<AudioState>>>` (see `engine-core::scene`) carries one of
/// these per scripted layer.
pub struct AudioState {
    instances: Vec<ClipInstance>,
    next_instance_id: u32,
    music_id: Option<u32>,
    music_volume: u8,
}

impl Default for AudioState {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioState {
    pub fn new() -> Self {
        Self { instances: Vec::new(), next_instance_id: 1, music_id: None, music_volume: 255 }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_instance_id;
        self.next_instance_id = self.next_instance_id.wrapping_add(1);
        id
    }

    fn build_instance(&mut self, clip_manager: &ClipManager, clip: ClipId, volume: u8, position: i8, flags: ClipInstanceFlags) -> Result<ClipInstance, EngineError> {
        let data = clip_manager.data(clip).ok_or_else(|| EngineError::InvalidArgument("unknown clip id".to_string()))?;
        clip_manager.acquire(clip);
        let id = self.next_id();
        let state = match &data {
            ClipData::Cached(_) => InstanceState::Cached { sample_index: 0 },
            ClipData::OnDemand(path) => {
                let decoder = asset_manager::SymphoniaDecoder::open(path.as_ref())?;
                InstanceState::OnDemand { shared: Arc::new(Mutex::new(OnDemandShared::new(Box::new(decoder)))) }
            }
        };
        Ok(ClipInstance { id, clip_id: clip, clip: data, volume, position, flags, state })
    }

    fn schedule_initial_decodes(&self, instance: &ClipInstance, worker: &DecoderWorker) {
        if let InstanceState::OnDemand { shared } = &instance.state {
            let looping = instance.flags.is_looping();
            for buffer_idx in 0..ON_DEMAND_BUFFERS {
                worker.schedule(Task::Decode { shared: shared.clone(), buffer_idx, looping });
            }
        }
    }

    /// Queues a one-shot or looping sound effect.
    pub fn queue_clip(&mut self, clip_manager: &ClipManager, worker: &DecoderWorker, clip: ClipId, volume: u8, position: i8) -> Result<u32, EngineError> {
        let instance = self.build_instance(clip_manager, clip, volume, position, ClipInstanceFlags::None)?;
        self.schedule_initial_decodes(&instance, worker);
        let id = instance.id;
        debug!(id, "queued clip");
        self.instances.push(instance);
        Ok(id)
    }

    /// Stops and drops every instance, releasing their clip-data references.
    pub fn clear(&mut self, clip_manager: &ClipManager) {
        for instance in self.instances.drain(..) {
            release_instance(clip_manager, &instance);
        }
        self.music_id = None;
    }

    pub fn music_play(&mut self, clip_manager: &ClipManager, worker: &DecoderWorker, clip: ClipId, looping: bool) -> Result<u32, EngineError> {
        self.music_stop(clip_manager);
        let flags = if looping { ClipInstanceFlags::Loop } else { ClipInstanceFlags::None };
        let instance = self.build_instance(clip_manager, clip, self.music_volume, 0, flags)?;
        self.schedule_initial_decodes(&instance, worker);
        let id = instance.id;
        self.instances.push(instance);
        self.music_id = Some(id);
        Ok(id)
    }

    /// Only one music instance is ever live; starting a new one, or an
    /// explicit stop, removes the previous one first.
    pub fn music_stop(&mut self, clip_manager: &ClipManager) {
        if let Some(id) = self.music_id.take() {
            if let Some(pos) = self.instances.iter().position(|i| i.id == id) {
                let instance = self.instances.remove(pos);
                release_instance(clip_manager, &instance);
            }
        }
    }

    /// `0` stops music; mutating the volume of a state that is not active
    /// only updates this setting for the next activation.
    pub fn music_set_volume(&mut self, clip_manager: &ClipManager, volume: u8) {
        self.music_volume = volume;
        if volume == 0 {
            self.music_stop(clip_manager);
            return;
        }
        if let Some(id) = self.music_id {
            if let Some(instance) = self.instances.iter_mut().find(|i| i.id == id) {
                instance.volume = volume;
            }
        }
    }

    /// Cached music is seeked by direct cursor assignment (no decoder state
    /// to invalidate, so this always succeeds); OnDemand music enqueues a
    /// seek task on the decoder worker.
    pub fn music_seek(&mut self, worker: &DecoderWorker, ms: u64) -> Result<(), EngineError> {
        let Some(id) = self.music_id else { return Ok(()) };
        let Some(instance) = self.instances.iter_mut().find(|i| i.id == id) else { return Ok(()) };
        match &instance.state {
            InstanceState::Cached { .. } => {
                let clip_len = instance.cached_len();
                let target_sample = ((ms as u128 * asset_manager::ENGINE_SAMPLE_RATE as u128 * asset_manager::ENGINE_CHANNELS as u128) / 1000) as usize;
                let InstanceState::Cached { sample_index } = &mut instance.state else { unreachable!() };
                *sample_index = if clip_len == 0 { 0 } else { target_sample.min(clip_len - 1) };
                Ok(())
            }
            InstanceState::OnDemand { shared } => {
                if !shared.lock().decoder.as_ref().map(|d| d.can_seek()).unwrap_or(false) {
                    return Err(EngineError::CantSeek);
                }
                let looping = instance.flags.is_looping();
                worker.schedule(Task::Seek { shared: shared.clone(), ms, looping });
                Ok(())
            }
        }
    }

    /// Mutable slice the mixer writes into, one callback at a time, while
    /// the caller holds the surrounding audio lock.
    pub fn instances_mut(&mut self) -> &mut [ClipInstance] {
        &mut self.instances
    }

    /// Drops every instance whose `volume` hit the removal sentinel the
    /// mixer sets after it finishes playing.
    pub fn reap_finished(&mut self, clip_manager: &ClipManager) {
        let mut i = 0;
        while i < self.instances.len() {
            if self.instances[i].volume == 0 {
                let instance = self.instances.remove(i);
                if self.music_id == Some(instance.id) {
                    self.music_id = None;
                }
                release_instance(clip_manager, &instance);
            } else {
                i += 1;
            }
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

fn release_instance(clip_manager: &ClipManager, instance: &ClipInstance) {
    clip_manager.release(instance.clip_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_test_wav(path: &Path, samples: &[i16]) {
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
    fn music_restart_replaces_the_previous_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.wav");
        let path_b = dir.path().join("b.wav");
        write_test_wav(&path_a, &[1, 2, 3, 4]);
        write_test_wav(&path_b, &[5, 6, 7, 8]);

        let clip_manager = ClipManager::new();
        let worker = DecoderWorker::spawn();
        let clip_a = clip_manager.load(path_a).unwrap();
        let clip_b = clip_manager.load(path_b).unwrap();

        let mut state = AudioState::new();
        state.music_play(&clip_manager, &worker, clip_a, true).unwrap();
        let count_after_a = state.instance_count();
        let music_b = state.music_play(&clip_manager, &worker, clip_b, false).unwrap();

        assert_eq!(state.instance_count(), count_after_a, "B replaces A net-zero, not additive");
        assert!(!state.instances.iter().any(|i| i.clip_id == clip_a), "A's instance is gone");
        assert!(state.instances.iter().any(|i| i.id == music_b));
    }

    #[test]
    fn reap_finished_clears_music_id_when_the_music_instance_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beep.wav");
        write_test_wav(&path, &[1, 2]);

        let clip_manager = ClipManager::new();
        let worker = DecoderWorker::spawn();
        let clip = clip_manager.load(path).unwrap();

        let mut state = AudioState::new();
        state.music_play(&clip_manager, &worker, clip, false).unwrap();
        state.instances[0].volume = 0;
        state.reap_finished(&clip_manager);

        assert_eq!(state.instance_count(), 0);
    }
}
