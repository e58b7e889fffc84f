//! audio-sequencer - sequential audio playback
//!
//! Join an ordered list of audio segments and play them back-to-back on a
//! blocking call, with a release that is safe to trigger from another
//! thread while playback is in progress.
//!
//! - [`sequencer`]: the lifecycle state machine and the strategy trait
//! - [`format`]: sample width / channel count to device enumerations
//! - [`audio`]: raw PCM segments and the mixing playback strategy
//! - [`output`]: output devices (cpal, WAVE file, in-memory capture)
//! - [`settings`]: persisted playback settings

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod audio;
pub mod format;
pub mod output;
pub mod sequencer;
pub mod settings;

pub use audio::{RawAudio, RawAudioFormat, RawAudioItem, RawAudioPlayback, RawAudioSequencer};
pub use format::{channel_config, encoding_for_bytes_per_sample, ChannelConfig, PcmEncoding};
pub use output::{OutputDevice, OutputError, OutputTrack};
pub use sequencer::{AudioAttributes, PlaybackStrategy, Sequencer, SequencerError, SequencerState};
pub use settings::Settings;

/// Lock a mutex, carrying on with the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
