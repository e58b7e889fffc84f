//! audio-sequencer - play a short chime through the sequencer
//!
//! Usage:
//!   audio-sequencer                 play on the configured output device
//!   audio-sequencer out.wav         render into a WAVE file instead
//!   audio-sequencer --list-devices  list output devices
//!
//! Ctrl-C releases the sequencer from the signal thread, which stops the
//! device and lets the blocked `play` return.

use std::f32::consts::TAU;
use std::sync::Arc;

use audio_sequencer::audio::FormatError;
use audio_sequencer::output::{output_device_names, CpalOutput, OutputDevice, WavFileOutput};
use audio_sequencer::{RawAudio, RawAudioItem, RawAudioPlayback, Sequencer, Settings};

/// The usual shared-mode rate of desktop output devices
const SAMPLE_RATE: u32 = 48000;

/// (frequency Hz, length ms, delay after previous ms)
const CHIME: [(f32, u32, i32); 3] = [(659.25, 180, 0), (880.0, 180, 40), (1318.5, 400, -60)];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Starting audio-sequencer");

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--list-devices") {
        for name in output_device_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let settings = Settings::load();
    let device: Box<dyn OutputDevice> = match arg {
        Some(path) if path.ends_with(".wav") => Box::new(WavFileOutput::new(path)),
        _ => Box::new(CpalOutput::new(settings.output_device.clone())),
    };

    let playback = RawAudioPlayback::new(device).with_buffer_ms(settings.buffer_ms);
    let sequencer = Arc::new(Sequencer::new(playback));
    settings.apply(&sequencer);

    for (frequency, length_ms, delay_ms) in CHIME {
        sequencer.add_sequence(RawAudioItem::with_delay(delay_ms, tone(frequency, length_ms)?))?;
    }

    let interrupted = Arc::clone(&sequencer);
    ctrlc::set_handler(move || {
        log::info!("Interrupted, releasing");
        interrupted.release();
    })?;

    sequencer.prepare()?;
    sequencer.play()?;
    sequencer.release();

    Settings::from_sequencer(&sequencer, &settings).save();

    log::info!("Done");
    Ok(())
}

/// A mono 16-bit sine tone with a short linear fade at both ends
fn tone(frequency: f32, length_ms: u32) -> Result<RawAudio, FormatError> {
    let frames = (SAMPLE_RATE * length_ms / 1000) as usize;
    let fade = (SAMPLE_RATE / 100) as usize;

    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let edge = i.min(frames - 1 - i);
            let envelope = (edge as f32 / fade as f32).min(1.0);
            ((TAU * frequency * t).sin() * envelope * 0.4 * f32::from(i16::MAX)) as i16
        })
        .collect();

    RawAudio::from_i16(&samples, SAMPLE_RATE, 1)
}
