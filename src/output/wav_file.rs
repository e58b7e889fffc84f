//! Render playback into a WAVE file
//!
//! Each track truncates the file and writes a placeholder header, then
//! patches the sizes in when it is closed. Writes never wait.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{OutputDevice, OutputError, OutputTrack, TrackSpec, WriteMode};
use crate::audio::{wav, RawAudioFormat};
use crate::format::PcmEncoding;
use crate::lock;

/// Output device writing to a `.wav` file
pub struct WavFileOutput {
    path: PathBuf,
}

impl WavFileOutput {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl OutputDevice for WavFileOutput {
    fn open(&self, spec: &TrackSpec) -> Result<Arc<dyn OutputTrack>, OutputError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(&wav::header(&spec.format, 0))?;
        log::info!("Rendering {} to {}", spec.format, self.path.display());

        Ok(Arc::new(WavFileTrack {
            format: spec.format,
            volume: spec.volume.clamp(0.0, 1.0),
            writer: Mutex::new(Some(Body {
                writer,
                data_len: 0,
            })),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }))
    }
}

struct Body {
    writer: BufWriter<File>,
    data_len: usize,
}

struct WavFileTrack {
    format: RawAudioFormat,
    volume: f32,
    /// `None` once closed
    writer: Mutex<Option<Body>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl OutputTrack for WavFileTrack {
    fn write(&self, data: &[u8], _mode: WriteMode) -> Result<usize, OutputError> {
        if self.stopped.load(Ordering::Acquire) {
            return Ok(0);
        }
        let mut guard = lock(&self.writer);
        let Some(body) = guard.as_mut() else {
            return Ok(0);
        };
        // Refuse data the header could not describe
        wav::data_len(body.data_len.saturating_add(data.len()))?;

        let scaled;
        let samples = if self.volume < 1.0 {
            scaled = scale(&self.format, data, self.volume);
            &scaled[..]
        } else {
            data
        };
        body.writer
            .write_all(&wav::to_little_endian(self.format.encoding(), samples))?;
        body.data_len += data.len();
        Ok(data.len())
    }

    fn start(&self) -> Result<(), OutputError> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.stopped.load(Ordering::Acquire)
    }

    fn drain(&self) {}

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn close(&self) -> Result<(), OutputError> {
        self.stop();
        let Some(mut body) = lock(&self.writer).take() else {
            return Ok(());
        };

        let data_len = wav::data_len(body.data_len)?;
        body.writer.seek(SeekFrom::Start(0))?;
        body.writer
            .write_all(&wav::header(&self.format, data_len))?;
        body.writer.flush()?;
        log::debug!("Wrote {} bytes of sample data", body.data_len);
        Ok(())
    }
}

/// Apply gain to native-endian samples
fn scale(format: &RawAudioFormat, data: &[u8], volume: f32) -> Vec<u8> {
    match format.encoding() {
        PcmEncoding::Pcm8Bit => data
            .iter()
            .map(|&b| ((f32::from(b) - 128.0) * volume + 128.0).round() as u8)
            .collect(),
        PcmEncoding::Pcm16Bit => data
            .chunks_exact(2)
            .flat_map(|c| {
                let s = f32::from(i16::from_ne_bytes([c[0], c[1]])) * volume;
                (s.round() as i16).to_ne_bytes()
            })
            .collect(),
        PcmEncoding::PcmFloat => data
            .chunks_exact(4)
            .flat_map(|c| (f32::from_ne_bytes([c[0], c[1], c[2], c[3]]) * volume).to_ne_bytes())
            .collect(),
        PcmEncoding::Invalid => data.to_vec(),
    }
}
