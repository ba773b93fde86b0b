//! The decoder contract the clip store and decoder worker are built on:
//! open, decode one fixed-size block, rewind, seek, query seekability.
//! `SymphoniaDecoder` is the only implementation; it wraps `symphonia`'s
//! probe/format/decode loop the way `streaming_loader.rs` did in the
//! teacher's prototype, minus the resampling stage (no non-decode
//! sample-rate conversion is in scope here).

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as SymphoniaCodec, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::util::{AssetError, ENGINE_CHANNELS, ENGINE_SAMPLE_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// `samples_written` valid samples landed in the caller's buffer; more
    /// remain in the stream.
    Ok { samples_written: usize },
    /// `samples_written` valid samples landed in the caller's buffer and the
    /// stream is now exhausted.
    Eof { samples_written: usize },
}

impl DecodeOutcome {
    pub fn samples_written(&self) -> usize {
        match *self {
            DecodeOutcome::Ok { samples_written } | DecodeOutcome::Eof { samples_written } => samples_written,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, DecodeOutcome::Eof { .. })
    }
}

pub trait Decoder: Send {
    /// Fills as much of `out` as the stream has left, at most `out.len()`
    /// interleaved samples.
    fn decode_block(&mut self, out: &mut [i16]) -> Result<DecodeOutcome, AssetError>;
    fn rewind(&mut self) -> Result<(), AssetError>;
    fn can_seek(&self) -> bool;
    fn seek_ms(&mut self, ms: u64) -> Result<(), AssetError>;
    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
}

pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaCodec>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    pending: Vec<i16>,
    pending_offset: usize,
    eof: bool,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AssetError::Decode(format!("probe: {e}")))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AssetError::Decode("no playable track".to_string()))?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(ENGINE_SAMPLE_RATE);
        let channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(ENGINE_CHANNELS);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AssetError::Decode(format!("codec: {e}")))?;

        Ok(Self { format, decoder, track_id, sample_rate, channels, pending: Vec::new(), pending_offset: 0, eof: false })
    }

    fn drain_pending(&mut self, out: &mut [i16]) -> usize {
        if self.pending_offset >= self.pending.len() {
            return 0;
        }
        let remaining = self.pending.len() - self.pending_offset;
        let n = remaining.min(out.len());
        out[..n].copy_from_slice(&self.pending[self.pending_offset..self.pending_offset + n]);
        self.pending_offset += n;
        if self.pending_offset >= self.pending.len() {
            self.pending.clear();
            self.pending_offset = 0;
        }
        n
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode_block(&mut self, out: &mut [i16]) -> Result<DecodeOutcome, AssetError> {
        let mut written = self.drain_pending(out);
        while written < out.len() {
            if self.eof {
                return Ok(DecodeOutcome::Eof { samples_written: written });
            }
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.eof = true;
                    return Ok(DecodeOutcome::Eof { samples_written: written });
                }
                Err(e) => return Err(AssetError::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(AssetError::Decode(e.to_string())),
            };
            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            let samples = sample_buf.samples();

            let room = out.len() - written;
            if samples.len() <= room {
                out[written..written + samples.len()].copy_from_slice(samples);
                written += samples.len();
            } else {
                out[written..].copy_from_slice(&samples[..room]);
                written += room;
                self.pending = samples[room..].to_vec();
                self.pending_offset = 0;
            }
        }
        Ok(DecodeOutcome::Ok { samples_written: written })
    }

    fn rewind(&mut self) -> Result<(), AssetError> {
        self.seek_ms(0)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn seek_ms(&mut self, ms: u64) -> Result<(), AssetError> {
        let time = Time::from(ms as f64 / 1000.0);
        self.format
            .seek(SeekMode::Accurate, SeekTo::Time { time, track_id: Some(self.track_id) })
            .map_err(|e| AssetError::Seek(e.to_string()))?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_offset = 0;
        self.eof = false;
        Ok(())
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal PCM16 stereo WAV file so tests can exercise the real
    /// symphonia probe/decode path without checking in a binary fixture.
    fn write_test_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[[i16; 2]]) {
        let data_len = frames.len() * 4;
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        let block_align = channels * 2;
        let byte_rate = sample_rate * block_align as u32;
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        for frame in frames {
            buf.extend_from_slice(&frame[0].to_le_bytes());
            buf.extend_from_slice(&frame[1].to_le_bytes());
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&buf).unwrap();
    }

    fn test_frames(n: usize) -> Vec<[i16; 2]> {
        (0..n).map(|i| [i as i16, -(i as i16)]).collect()
    }

    #[test]
    fn decode_block_reports_sample_rate_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 2, 44_100, &test_frames(200));

        let decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.sample_rate(), 44_100);
        assert!(decoder.can_seek());
    }

    #[test]
    fn decode_block_splits_across_calls_and_reports_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 2, 44_100, &test_frames(100));

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        let mut collected = Vec::new();
        loop {
            let mut block = [0i16; 50];
            let outcome = decoder.decode_block(&mut block).unwrap();
            let n = outcome.samples_written();
            collected.extend_from_slice(&block[..n]);
            if outcome.is_eof() {
                break;
            }
        }
        assert_eq!(collected.len(), 200);
        assert_eq!(&collected[..4], &[0, 0, 1, -1]);
    }

    #[test]
    fn rewind_restarts_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 2, 44_100, &test_frames(50));

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        let mut first = [0i16; 100];
        decoder.decode_block(&mut first).unwrap();

        decoder.rewind().unwrap();
        let mut second = [0i16; 100];
        decoder.decode_block(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = SymphoniaDecoder::open(Path::new("/no/such/asset.wav"));
        assert!(err.is_err());
    }
}
