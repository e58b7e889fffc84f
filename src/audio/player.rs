//! Raw PCM playback strategy
//!
//! Mixes the segments into one buffer when the sequence is prepared, then
//! streams that buffer through an [`OutputDevice`] track on every play.
//! `cleanup` stops the open track, which is what makes a play blocked on
//! another thread return.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::mix::{mix, RawAudioItem};
use super::raw::{RawAudio, RawAudioFormat};
use crate::lock;
use crate::output::{OutputDevice, OutputError, OutputTrack, TrackSpec, WriteMode};
use crate::sequencer::{AudioAttributes, PlaybackStrategy, Sequencer};

/// Default device buffer length
pub const DEFAULT_BUFFER_MS: u32 = 100;

/// Sequencer over raw PCM segments
pub type RawAudioSequencer = Sequencer<RawAudioPlayback>;

impl Sequencer<RawAudioPlayback> {
    /// Raw PCM sequencer playing through `device`
    pub fn with_device(device: Box<dyn OutputDevice>) -> Self {
        Sequencer::new(RawAudioPlayback::new(device))
    }
}

#[derive(Default)]
struct CurrentTrack {
    track: Option<Arc<dyn OutputTrack>>,
    /// Set by cleanup; no track may be opened afterwards
    released: bool,
}

/// [`PlaybackStrategy`] for [`RawAudioItem`] segments
pub struct RawAudioPlayback {
    device: Box<dyn OutputDevice>,

    /// Gain (AtomicU32 with f32 bits)
    volume: AtomicU32,

    buffer_ms: u32,

    /// Mixed sequence, present between build and cleanup
    playable: Mutex<Option<Arc<RawAudio>>>,

    current: Mutex<CurrentTrack>,
}

impl RawAudioPlayback {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            volume: AtomicU32::new(1.0_f32.to_bits()),
            buffer_ms: DEFAULT_BUFFER_MS,
            playable: Mutex::new(None),
            current: Mutex::new(CurrentTrack::default()),
        }
    }

    /// Device buffer length; at least one frame is always used
    pub fn with_buffer_ms(mut self, buffer_ms: u32) -> Self {
        self.buffer_ms = buffer_ms;
        self
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Set the gain, clamped to 0.0..=1.0; applies from the next play
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Format of the mixed sequence, once built
    pub fn playable_format(&self) -> Option<RawAudioFormat> {
        lock(&self.playable).as_ref().map(|audio| *audio.format())
    }

    /// The mixed sequence, once built
    pub fn playable(&self) -> Option<Arc<RawAudio>> {
        lock(&self.playable).clone()
    }

    fn buffer_bytes(&self, format: &RawAudioFormat) -> usize {
        let frames = format.frames_for_ms(i64::from(self.buffer_ms)).max(1) as usize;
        frames * format.bytes_per_frame()
    }

    /// Write all of `data` to a fresh track, then wait for it to play out
    fn stream(&self, track: &dyn OutputTrack, data: &[u8]) -> Result<(), OutputError> {
        log::debug!("play: writing first buffer");
        let mut written = track.write(data, WriteMode::NonBlocking)?;

        log::debug!("play: starting track");
        track.start()?;

        while written < data.len() {
            if !track.is_playing() {
                log::debug!("play: track stopped");
                return Ok(());
            }
            let n = track.write(&data[written..], WriteMode::Blocking)?;
            if n == 0 {
                log::debug!("play: write returned no data");
                return Ok(());
            }
            written += n;
        }

        log::debug!("play: all data written");
        track.drain();
        Ok(())
    }

    /// Close the track unless cleanup already took it
    fn finish(&self) -> Result<(), OutputError> {
        let track = lock(&self.current).track.take();
        match track {
            Some(track) => track.close(),
            None => Ok(()),
        }
    }
}

impl PlaybackStrategy for RawAudioPlayback {
    type Item = RawAudioItem;

    fn build_playable(
        &self,
        items: &[RawAudioItem],
        _attributes: AudioAttributes,
    ) -> Result<(), OutputError> {
        let mixed = mix(items)?;
        log::debug!(
            "Built playable sequence: {}, {:.3} s",
            mixed.format(),
            mixed.duration().as_secs_f64()
        );
        *lock(&self.playable) = Some(Arc::new(mixed));
        Ok(())
    }

    fn play_once(&self, attributes: AudioAttributes) -> Result<(), OutputError> {
        let audio = self.playable().ok_or(OutputError::NotBuilt)?;
        let format = *audio.format();
        let spec = TrackSpec {
            format,
            attributes,
            volume: self.volume(),
            buffer_bytes: self.buffer_bytes(&format),
        };
        log::debug!("play: format = {}, buffer = {} bytes", format, spec.buffer_bytes);

        let track = self.device.open(&spec)?;
        {
            let mut current = lock(&self.current);
            if current.released {
                // Released while the device was opening
                drop(current);
                return track.close();
            }
            current.track = Some(Arc::clone(&track));
        }

        let result = self.stream(&*track, audio.data());
        let closed = self.finish();
        result.and(closed)
    }

    fn cleanup(&self) {
        log::debug!("cleanup: start");
        let track = {
            let mut current = lock(&self.current);
            current.released = true;
            current.track.take()
        };
        if let Some(track) = track {
            if let Err(e) = track.close() {
                log::warn!("cleanup: failed to close track: {}", e);
            }
        }
        lock(&self.playable).take();
        log::debug!("cleanup: end");
    }
}
