//! The real-time mix step. Grounded on `original_source/r_audio.c`'s
//! `r_audio_callback`, `r_audio_compute_volume_numerator`,
//! `r_audio_compute_channel_numerator`, and `R_AUDIO_SAMPLE_SCALE`.

use crate::clip::{BufferStatus, ClipData, ClipInstance, InstanceState, ON_DEMAND_BUFFERS};
use crate::worker::{DecoderWorker, Task};

/// `R_AUDIO_POSITION_MAX` — denominator (as a signed offset) for the
/// per-channel pan numerator.
pub const POSITION_MAX: i32 = 0x7f;

fn volume_numerator(global_volume: i32, volume: u8) -> i32 {
    global_volume * (volume as i32 + 1)
}

fn channel_numerator(channel: usize, position: i8) -> i32 {
    POSITION_MAX + if channel == 0 { -1 } else { 1 } * position as i32
}

fn sample_scale(sample: i16, volume_num: i32, channel_num: i32) -> i32 {
    (((volume_num * sample as i32) >> 16) * channel_num) >> 8
}

/// Mixes `instances` into `out` (interleaved `i16`, `out.len()` samples,
/// always a multiple of 2). `global_volume` is `0..=255`; callers add one to
/// match the source's "volume + 1" convention before calling.
pub fn mix(instances: &mut [ClipInstance], global_volume: i32, worker: &DecoderWorker, out: &mut [i16]) {
    let samples = out.len();
    let mut scratch = vec![0i32; samples];

    for instance in instances.iter_mut() {
        let volume_num = volume_numerator(global_volume, instance.volume);
        let channel_num = [channel_numerator(0, instance.position), channel_numerator(1, instance.position)];

        match &instance.clip {
            ClipData::Cached(clip_samples) => {
                mix_cached(instance, clip_samples, samples, volume_num, channel_num, &mut scratch);
            }
            ClipData::OnDemand(_) => {
                mix_on_demand(instance, samples, volume_num, channel_num, worker, &mut scratch);
            }
        }
    }

    for (o, s) in out.iter_mut().zip(scratch.iter()) {
        *o = (*s).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
}

fn mix_cached(instance: &mut ClipInstance, clip_samples: &[i16], samples: usize, volume_num: i32, channel_num: [i32; 2], scratch: &mut [i32]) {
    let InstanceState::Cached { sample_index } = &mut instance.state else { return };
    let clip_len = clip_samples.len();
    if clip_len == 0 {
        instance.volume = 0;
        return;
    }
    let looping = instance.flags.is_looping();
    let j_max = if looping { samples } else { samples.min(clip_len.saturating_sub(*sample_index)) };

    let mut k = *sample_index;
    for j in 0..j_max {
        let channel = j & 1;
        scratch[j] += sample_scale(clip_samples[k], volume_num, channel_num[channel]);
        k = (k + 1) % clip_len;
    }
    *sample_index += j_max;

    if *sample_index >= clip_len {
        if looping {
            *sample_index %= clip_len;
        } else {
            instance.volume = 0;
        }
    }
}

fn mix_on_demand(instance: &mut ClipInstance, samples: usize, volume_num: i32, channel_num: [i32; 2], worker: &DecoderWorker, scratch: &mut [i32]) {
    let InstanceState::OnDemand { shared } = &instance.state else { return };
    let looping = instance.flags.is_looping();
    let mut g = shared.lock();
    let mut buffer_index = g.buffer_index;

    if !matches!(g.status[buffer_index], BufferStatus::Ok | BufferStatus::FullyDecoded) {
        return;
    }

    let mut k = g.sample_index;
    let mut j = 0;
    'outer: while j < samples {
        let buffer_samples = g.buffer_samples[buffer_index];
        while k < buffer_samples && j < samples {
            let channel = j & 1;
            scratch[j] += sample_scale(g.buffers[buffer_index][k], volume_num, channel_num[channel]);
            k += 1;
            j += 1;
        }

        if k >= buffer_samples {
            if g.status[buffer_index] == BufferStatus::FullyDecoded && !looping {
                instance.volume = 0;
                break 'outer;
            }

            g.status[buffer_index] = BufferStatus::Pending;
            let decode_idx = buffer_index;
            let next_buffer_index = (buffer_index + 1) % ON_DEMAND_BUFFERS;
            buffer_index = next_buffer_index;
            k = 0;

            drop(g);
            worker.schedule(Task::Decode { shared: shared.clone(), buffer_idx: decode_idx, looping });
            g = shared.lock();

            if g.status[buffer_index] != BufferStatus::Ok && g.status[buffer_index] != BufferStatus::FullyDecoded {
                break 'outer;
            }
        }
    }

    g.buffer_index = buffer_index;
    g.sample_index = k;
}
