//! Audio module - raw PCM data and its playback strategy
//!
//! This module provides:
//! - Raw PCM blocks and their format
//! - Timeline layout and clipped mixing of delayed segments
//! - WAVE encoding
//! - The raw PCM playback strategy for the sequencer

mod mix;
mod player;
mod raw;
pub mod wav;

pub use mix::{layout, mix, RawAudioItem};
pub use player::{RawAudioPlayback, RawAudioSequencer, DEFAULT_BUFFER_MS};
pub use raw::{decode_f32, FormatError, RawAudio, RawAudioFormat};
