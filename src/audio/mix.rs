//! Timeline layout and mixing
//!
//! Each segment starts `delay_ms` after the previous one ends. A negative
//! delay overlaps the previous segment; overlapping samples are summed and
//! clipped to the range of the encoding.

use crate::format::PcmEncoding;
use crate::output::OutputError;

use super::raw::{RawAudio, RawAudioFormat};

/// One segment of a raw audio sequence
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudioItem {
    /// Gap after the previous segment ends, in milliseconds (may be negative)
    pub delay_ms: i32,
    pub audio: RawAudio,
}

impl RawAudioItem {
    pub fn new(audio: RawAudio) -> Self {
        Self { delay_ms: 0, audio }
    }

    pub fn with_delay(delay_ms: i32, audio: RawAudio) -> Self {
        Self { delay_ms, audio }
    }
}

/// Start frame of every item and the total length in frames
pub fn layout(items: &[RawAudioItem], format: &RawAudioFormat) -> (Vec<usize>, usize) {
    let mut starts = Vec::with_capacity(items.len());
    let mut last_end: i64 = 0;
    let mut total: i64 = 0;

    for item in items {
        let start = (last_end + format.frames_for_ms(i64::from(item.delay_ms))).max(0);
        starts.push(start as usize);
        last_end = start + item.audio.frames() as i64;
        total = total.max(last_end);
    }

    (starts, total as usize)
}

/// Mix all items into a single block in the first item's format
pub fn mix(items: &[RawAudioItem]) -> Result<RawAudio, OutputError> {
    let Some(first) = items.first() else {
        return Err(OutputError::NotBuilt);
    };
    let format = *first.audio.format();

    for (index, item) in items.iter().enumerate() {
        if *item.audio.format() != format {
            return Err(OutputError::FormatMismatch {
                index,
                expected: format,
                found: *item.audio.format(),
            });
        }
    }

    let (starts, total_frames) = layout(items, &format);
    let mut dest = RawAudio::silent(total_frames, format);
    let frame = format.bytes_per_frame();

    for (item, start) in items.iter().zip(starts) {
        let offset = start * frame;
        let source = item.audio.data();
        let target = &mut dest.data_mut()[offset..offset + source.len()];
        mix_into(format.encoding(), target, source);
    }

    log::debug!(
        "Mixed {} segment(s) into {} frames ({})",
        items.len(),
        total_frames,
        format
    );
    Ok(dest)
}

/// Sum `source` into `dest` sample by sample with clipping
fn mix_into(encoding: PcmEncoding, dest: &mut [u8], source: &[u8]) {
    match encoding {
        PcmEncoding::Pcm8Bit => {
            for (d, &s) in dest.iter_mut().zip(source) {
                let sum = (i16::from(*d) - 128) + (i16::from(s) - 128);
                *d = (sum.clamp(-128, 127) + 128) as u8;
            }
        }
        PcmEncoding::Pcm16Bit => {
            for (d, s) in dest.chunks_exact_mut(2).zip(source.chunks_exact(2)) {
                let sum = i32::from(i16::from_ne_bytes([d[0], d[1]]))
                    + i32::from(i16::from_ne_bytes([s[0], s[1]]));
                let clipped = sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
                d.copy_from_slice(&clipped.to_ne_bytes());
            }
        }
        PcmEncoding::PcmFloat => {
            for (d, s) in dest.chunks_exact_mut(4).zip(source.chunks_exact(4)) {
                let sum = f32::from_ne_bytes([d[0], d[1], d[2], d[3]])
                    + f32::from_ne_bytes([s[0], s[1], s[2], s[3]]);
                d.copy_from_slice(&sum.clamp(-1.0, 1.0).to_ne_bytes());
            }
        }
        PcmEncoding::Invalid => {
            log::error!("Cannot mix samples with an invalid encoding");
        }
    }
}
