//! Raw PCM audio and its format

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::format::{channel_config, encoding_for_bytes_per_sample, ChannelConfig, PcmEncoding};

/// Errors describing a PCM format the sequencer cannot play
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unsupported sample width: {0} bytes")]
    SampleWidth(i32),

    #[error("Unsupported channel count: {0}")]
    Channels(i32),

    #[error("Invalid sample rate: {0} Hz")]
    SampleRate(u32),

    #[error("{len} bytes is not a whole number of {frame}-byte frames")]
    PartialFrame { len: usize, frame: usize },

    #[error("Unplayable PCM encoding: {0:?}")]
    Encoding(PcmEncoding),

    #[error("{0} bytes of sample data do not fit a WAVE header")]
    DataTooLong(usize),
}

/// Layout of interleaved native-endian PCM data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAudioFormat {
    sample_rate: u32,
    channels: u16,
    encoding: PcmEncoding,
}

impl RawAudioFormat {
    /// Build a format from sample width in bytes per channel sample
    pub fn new(sample_rate: u32, channels: u16, bytes_per_sample: i32) -> Result<Self, FormatError> {
        Self::with_encoding(
            sample_rate,
            channels,
            encoding_for_bytes_per_sample(bytes_per_sample),
        )
        .map_err(|e| match e {
            FormatError::Encoding(_) => FormatError::SampleWidth(bytes_per_sample),
            other => other,
        })
    }

    pub fn with_encoding(
        sample_rate: u32,
        channels: u16,
        encoding: PcmEncoding,
    ) -> Result<Self, FormatError> {
        if !encoding.is_valid() {
            return Err(FormatError::Encoding(encoding));
        }
        if !channel_config(i32::from(channels)).is_valid() {
            return Err(FormatError::Channels(i32::from(channels)));
        }
        if sample_rate == 0 {
            return Err(FormatError::SampleRate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            channels,
            encoding,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn encoding(&self) -> PcmEncoding {
        self.encoding
    }

    pub fn channel_config(&self) -> ChannelConfig {
        channel_config(i32::from(self.channels))
    }

    /// Bytes making up one sample of one channel
    pub fn bytes_per_sample_at_channel(&self) -> usize {
        // Constructors reject Invalid
        self.encoding.bytes_per_sample().unwrap_or(1)
    }

    /// Bytes making up one sample of every channel
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample_at_channel() * usize::from(self.channels)
    }

    /// Signed frame count for a span of milliseconds, truncated toward zero
    pub fn frames_for_ms(&self, ms: i64) -> i64 {
        ms * i64::from(self.sample_rate) / 1000
    }

    pub fn duration_of_frames(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    /// Byte value of one silent channel sample
    pub(crate) fn silence(&self) -> u8 {
        match self.encoding {
            PcmEncoding::Pcm8Bit => 128,
            _ => 0,
        }
    }
}

impl fmt::Display for RawAudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audio/raw, {} Hz, {} ch, {:?}",
            self.sample_rate, self.channels, self.encoding
        )
    }
}

/// A block of raw PCM data
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    data: Vec<u8>,
    format: RawAudioFormat,
}

impl RawAudio {
    /// Wrap PCM bytes; the length must be a whole number of frames
    pub fn new(data: Vec<u8>, format: RawAudioFormat) -> Result<Self, FormatError> {
        let frame = format.bytes_per_frame();
        if data.len() % frame != 0 {
            return Err(FormatError::PartialFrame {
                len: data.len(),
                frame,
            });
        }
        Ok(Self { data, format })
    }

    /// Interleaved signed 16-bit samples
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Self, FormatError> {
        let format = RawAudioFormat::with_encoding(sample_rate, channels, PcmEncoding::Pcm16Bit)?;
        let data = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        Self::new(data, format)
    }

    /// Interleaved float samples in -1.0..=1.0
    pub fn from_f32(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Self, FormatError> {
        let format = RawAudioFormat::with_encoding(sample_rate, channels, PcmEncoding::PcmFloat)?;
        let data = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        Self::new(data, format)
    }

    /// Silence lasting `frames` frames
    pub fn silent(frames: usize, format: RawAudioFormat) -> Self {
        Self {
            data: vec![format.silence(); frames * format.bytes_per_frame()],
            format,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn format(&self) -> &RawAudioFormat {
        &self.format
    }

    pub fn length_in_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.format.bytes_per_frame()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of_frames(self.frames())
    }
}

/// Append `bytes` decoded as float samples to `out`.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode_f32(encoding: PcmEncoding, bytes: &[u8], out: &mut Vec<f32>) {
    match encoding {
        PcmEncoding::Pcm8Bit => {
            out.extend(bytes.iter().map(|&b| (f32::from(b) - 128.0) / 128.0));
        }
        PcmEncoding::Pcm16Bit => {
            out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|c| f32::from(i16::from_ne_bytes([c[0], c[1]])) / 32768.0),
            );
        }
        PcmEncoding::PcmFloat => {
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        PcmEncoding::Invalid => {}
    }
}
