//! Clip storage: a clip is either fully decoded up front (`Cached`) or
//! streamed on demand through a ring of decode buffers (`OnDemand`). Grounded
//! on `original_source/r_audio.h`'s `r_audio_clip_data_t`/`r_audio_clip_instance_t`
//! union split, adapted to Rust's `enum` instead of a tagged C union.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use asset_manager::{AssetError, Decoder, SymphoniaDecoder, CACHED_MAX_BYTES, ON_DEMAND_BUFFER_BYTES};
use parking_lot::Mutex;

/// Number of per-instance decode buffers kept in flight for an on-demand
/// clip, matching `R_AUDIO_CLIP_ON_DEMAND_BUFFERS`.
pub const ON_DEMAND_BUFFERS: usize = 3;

/// Samples (not bytes) per decode buffer.
pub const ON_DEMAND_BUFFER_SAMPLES: usize = ON_DEMAND_BUFFER_BYTES / 2;
const CACHED_MAX_SAMPLES: usize = CACHED_MAX_BYTES / 2;

pub type ClipId = u32;

/// What a loaded clip turned out to be: small enough to decode in full up
/// front, or large enough to stream.
#[derive(Clone)]
pub enum ClipData {
    Cached(Arc<[i16]>),
    OnDemand(Arc<PathBuf>),
}

struct ClipEntry {
    data: ClipData,
    ref_count: usize,
}

/// Global registry of loaded clip data, ref-counted by the instances that
/// reference each one. Grounded on `r_audio_clip_manager.c`.
pub struct ClipManager {
    entries: Mutex<Vec<(ClipId, ClipEntry)>>,
    next_id: AtomicU32,
}

impl Default for ClipManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipManager {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()), next_id: AtomicU32::new(1) }
    }

    /// Decodes up to `CACHED_MAX_BYTES` worth of samples from `path`. If EOF
    /// lands inside that budget the clip is cached in full; otherwise it's
    /// kept as a path to stream on demand.
    pub fn load(&self, path: PathBuf) -> Result<ClipId, AssetError> {
        let mut decoder = SymphoniaDecoder::open(&path)?;
        let mut probe = vec![0i16; CACHED_MAX_SAMPLES];
        let outcome = decoder.decode_block(&mut probe)?;

        let data = if outcome.is_eof() {
            probe.truncate(outcome.samples_written());
            ClipData::Cached(Arc::from(probe))
        } else {
            ClipData::OnDemand(Arc::new(path))
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, ClipEntry { data, ref_count: 0 }));
        Ok(id)
    }

    pub fn data(&self, id: ClipId) -> Option<ClipData> {
        self.entries.lock().iter().find(|(k, _)| *k == id).map(|(_, e)| e.data.clone())
    }

    pub fn acquire(&self, id: ClipId) {
        let mut entries = self.entries.lock();
        if let Some((_, e)) = entries.iter_mut().find(|(k, _)| *k == id) {
            e.ref_count += 1;
        }
    }

    /// Drops one reference; frees the entry once nothing holds it.
    pub fn release(&self, id: ClipId) {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|(k, _)| *k == id) {
            entries[pos].1.ref_count = entries[pos].1.ref_count.saturating_sub(1);
            if entries[pos].1.ref_count == 0 {
                entries.remove(pos);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Pending,
    Ok,
    FullyDecoded,
    Error,
}

/// State shared between the mixer and the decoder worker for one on-demand
/// instance. Lives behind its own lock so a decode in flight never blocks
/// the audio callback, which only holds this lock for the quick bookkeeping
/// steps (never across a `decode_block` call).
pub struct OnDemandShared {
    pub decoder: Option<Box<dyn Decoder>>,
    pub buffers: [Vec<i16>; ON_DEMAND_BUFFERS],
    pub status: [BufferStatus; ON_DEMAND_BUFFERS],
    pub buffer_samples: [usize; ON_DEMAND_BUFFERS],
    pub buffer_index: usize,
    pub sample_index: usize,
    pub eof: bool,
}

impl OnDemandShared {
    pub fn new(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder: Some(decoder),
            buffers: std::array::from_fn(|_| vec![0i16; ON_DEMAND_BUFFER_SAMPLES]),
            status: [BufferStatus::Pending; ON_DEMAND_BUFFERS],
            buffer_samples: [0; ON_DEMAND_BUFFERS],
            buffer_index: 0,
            sample_index: 0,
            eof: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipInstanceFlags {
    None,
    Loop,
}

impl ClipInstanceFlags {
    pub fn is_looping(self) -> bool {
        matches!(self, ClipInstanceFlags::Loop)
    }
}

pub enum InstanceState {
    Cached { sample_index: usize },
    OnDemand { shared: Arc<Mutex<OnDemandShared>> },
}

/// One playing voice. `volume == 0` is the removal sentinel the mixer uses
/// after a non-looping clip finishes or an error kills the voice.
pub struct ClipInstance {
    pub id: u32,
    pub clip_id: ClipId,
    pub clip: ClipData,
    pub volume: u8,
    pub position: i8,
    pub flags: ClipInstanceFlags,
    pub state: InstanceState,
}

impl PartialEq for ClipInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ClipInstance {
    pub fn cached_len(&self) -> usize {
        match &self.clip {
            ClipData::Cached(samples) => samples.len(),
            ClipData::OnDemand(_) => 0,
        }
    }
}
