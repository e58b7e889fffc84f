//! Output module - the device side of playback
//!
//! This module provides:
//! - The `OutputDevice` / `OutputTrack` traits a strategy plays through
//! - A real device backed by cpal
//! - A WAVE file renderer
//! - An in-memory capture sink
//!
//! ## Stop contract
//!
//! `OutputTrack::stop` may be called from any thread while another thread
//! is blocked in `write` or `drain`. Every backend must make those calls
//! return promptly once stopped (`write` with a short count). This is what
//! lets a concurrent `Sequencer::release` unblock `Sequencer::play`.

mod capture;
mod cpal_output;
mod wav_file;

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{FormatError, RawAudioFormat};
use crate::sequencer::AudioAttributes;

pub use cpal_output::{output_device_names, CpalOutput};
pub use capture::CaptureOutput;
pub use wav_file::WavFileOutput;

/// Errors raised by output devices and by strategies playing through them
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output device unavailable: {0}")]
    Device(String),

    #[error("Output stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    Format(#[from] FormatError),

    #[error("Segment {index} is {found}, sequence is {expected}")]
    FormatMismatch {
        index: usize,
        expected: RawAudioFormat,
        found: RawAudioFormat,
    },

    #[error("No playable sequence has been built")]
    NotBuilt,
}

/// Parameters a track is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSpec {
    pub format: RawAudioFormat,

    /// Passed through untouched; only the device knows what they mean
    pub attributes: AudioAttributes,

    /// Gain in 0.0..=1.0
    pub volume: f32,

    /// Device-side buffer size, a whole number of frames
    pub buffer_bytes: usize,
}

/// How long `write` may wait for buffer space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Accept whatever fits right now
    NonBlocking,
    /// Wait until everything is queued or the track is stopped
    Blocking,
}

/// Something that can open playback tracks
pub trait OutputDevice: Send + Sync {
    fn open(&self, spec: &TrackSpec) -> Result<Arc<dyn OutputTrack>, OutputError>;
}

/// One open playback stream.
///
/// All methods take `&self`; `stop` in particular is called from whichever
/// thread releases the sequencer.
pub trait OutputTrack: Send + Sync {
    /// Queue PCM bytes in the track's format, returning how many were taken
    fn write(&self, data: &[u8], mode: WriteMode) -> Result<usize, OutputError>;

    fn start(&self) -> Result<(), OutputError>;

    /// Started and not yet stopped
    fn is_playing(&self) -> bool;

    /// Wait until queued audio has been played out, or the track is stopped
    fn drain(&self);

    fn stop(&self);

    /// Stop if needed and free the track's resources
    fn close(&self) -> Result<(), OutputError>;
}
