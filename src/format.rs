//! Sample-format and channel-layout mapping
//!
//! Translates sample width and channel count into the encoding and
//! channel-mask enumerations an output track is opened with. Unsupported
//! inputs map to an `Invalid` sentinel instead of failing; callers check
//! for it and reject the format themselves.

/// PCM encoding of a single channel sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmEncoding {
    /// Unsigned 8-bit PCM, silence at 128
    Pcm8Bit,
    /// Signed 16-bit PCM
    Pcm16Bit,
    /// 32-bit float PCM in -1.0..=1.0
    PcmFloat,
    Invalid,
}

impl PcmEncoding {
    /// Device-level encoding code
    pub fn code(self) -> i32 {
        match self {
            PcmEncoding::Pcm16Bit => 2,
            PcmEncoding::Pcm8Bit => 3,
            PcmEncoding::PcmFloat => 4,
            PcmEncoding::Invalid => 0,
        }
    }

    /// Bytes per single-channel sample, `None` for `Invalid`
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            PcmEncoding::Pcm8Bit => Some(1),
            PcmEncoding::Pcm16Bit => Some(2),
            PcmEncoding::PcmFloat => Some(4),
            PcmEncoding::Invalid => None,
        }
    }

    /// Matching cpal sample format
    pub fn sample_format(self) -> Option<cpal::SampleFormat> {
        match self {
            PcmEncoding::Pcm8Bit => Some(cpal::SampleFormat::U8),
            PcmEncoding::Pcm16Bit => Some(cpal::SampleFormat::I16),
            PcmEncoding::PcmFloat => Some(cpal::SampleFormat::F32),
            PcmEncoding::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self != PcmEncoding::Invalid
    }
}

/// Output channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelConfig {
    Mono,
    Stereo,
    Invalid,
}

impl ChannelConfig {
    /// Device-level channel mask
    pub fn code(self) -> i32 {
        match self {
            ChannelConfig::Mono => 0x4,
            ChannelConfig::Stereo => 0x4 | 0x8,
            ChannelConfig::Invalid => 0,
        }
    }

    pub fn channel_count(self) -> Option<u16> {
        match self {
            ChannelConfig::Mono => Some(1),
            ChannelConfig::Stereo => Some(2),
            ChannelConfig::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        self != ChannelConfig::Invalid
    }
}

/// Encoding for a sample width given in bytes per single-channel sample
pub fn encoding_for_bytes_per_sample(bytes_per_sample: i32) -> PcmEncoding {
    match bytes_per_sample {
        1 => PcmEncoding::Pcm8Bit,
        2 => PcmEncoding::Pcm16Bit,
        4 => PcmEncoding::PcmFloat,
        _ => PcmEncoding::Invalid,
    }
}

/// Channel layout for a channel count
pub fn channel_config(channels: i32) -> ChannelConfig {
    match channels {
        1 => ChannelConfig::Mono,
        2 => ChannelConfig::Stereo,
        _ => ChannelConfig::Invalid,
    }
}
