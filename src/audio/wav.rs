//! RIFF/WAVE encoding of raw PCM

use crate::format::PcmEncoding;

use super::raw::{FormatError, RawAudio, RawAudioFormat};

/// Size of the canonical header written by [`header`]
pub const HEADER_LEN: usize = 44;

/// Largest data chunk whose RIFF size still fits in 32 bits
pub const MAX_DATA_LEN: usize = u32::MAX as usize - 36;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// `len` as a data chunk size, if a WAVE file can hold it
pub fn data_len(len: usize) -> Result<u32, FormatError> {
    if len > MAX_DATA_LEN {
        return Err(FormatError::DataTooLong(len));
    }
    Ok(len as u32)
}

/// Canonical 44-byte WAVE header for `data_len` bytes of sample data.
///
/// `data_len` must come from [`data_len`].
pub fn header(format: &RawAudioFormat, data_len: u32) -> [u8; HEADER_LEN] {
    let format_tag = match format.encoding() {
        PcmEncoding::PcmFloat => FORMAT_IEEE_FLOAT,
        _ => FORMAT_PCM,
    };
    let block_align = format.bytes_per_frame() as u16;
    let byte_rate = format.sample_rate() * u32::from(block_align);
    let bits = (format.bytes_per_sample_at_channel() * 8) as u16;

    let mut out = [0u8; HEADER_LEN];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&(data_len + 36).to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&format_tag.to_le_bytes());
    out[22..24].copy_from_slice(&format.channels().to_le_bytes());
    out[24..28].copy_from_slice(&format.sample_rate().to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&bits.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_len.to_le_bytes());
    out
}

/// Native-endian samples to the little-endian layout WAVE requires
pub fn to_little_endian(encoding: PcmEncoding, data: &[u8]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return data.to_vec();
    }
    let width = encoding.bytes_per_sample().unwrap_or(1);
    data.chunks(width)
        .flat_map(|sample| sample.iter().rev().copied())
        .collect()
}

/// Complete WAVE file image of `audio`
pub fn encode(audio: &RawAudio) -> Result<Vec<u8>, FormatError> {
    let format = audio.format();
    let len = data_len(audio.length_in_bytes())?;
    let mut out = Vec::with_capacity(HEADER_LEN + audio.length_in_bytes());
    out.extend_from_slice(&header(format, len));
    out.extend(to_little_endian(format.encoding(), audio.data()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn test_header_fields() {
        let audio = RawAudio::from_i16(&[1, -1, 2, -2], 44100, 2).unwrap();
        let wav = encode(&audio).unwrap();

        assert_eq!(wav.len(), HEADER_LEN + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 8);
        assert_eq!(&wav[8..16], b"WAVEfmt ");
        assert_eq!(u16_at(&wav, 20), FORMAT_PCM);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 44100 * 4);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 8);
        assert_eq!(u16_at(&wav, 44) as i16, 1);
        assert_eq!(u16_at(&wav, 46) as i16, -1);
    }

    #[test]
    fn test_float_format_tag() {
        let audio = RawAudio::from_f32(&[0.5], 8000, 1).unwrap();
        let wav = encode(&audio).unwrap();
        assert_eq!(u16_at(&wav, 20), FORMAT_IEEE_FLOAT);
        assert_eq!(u16_at(&wav, 34), 32);
        assert_eq!(u32_at(&wav, 44), 0.5f32.to_bits());
    }

    #[test]
    fn test_data_len_limit() {
        assert_eq!(data_len(0), Ok(0));
        assert_eq!(data_len(MAX_DATA_LEN), Ok(u32::MAX - 36));
        assert_eq!(
            data_len(MAX_DATA_LEN + 1),
            Err(FormatError::DataTooLong(MAX_DATA_LEN + 1))
        );
    }
}
