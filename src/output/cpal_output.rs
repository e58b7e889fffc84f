//! Audio output through cpal
//!
//! The stream is built and owned by a dedicated thread (cpal streams are
//! not `Send` on every platform). Samples travel to the real-time callback
//! through a lock-free SPSC ring: the writing thread is the producer, the
//! cpal callback the consumer. A full ring makes blocking writes sleep-poll
//! until the callback has drained some of it, so `write` takes roughly as
//! long as the audio it queues. Queued and played sample counters tell
//! `drain` when the ring has been played out.
//!
//! The device is asked for a config that carries the segment's sample rate.
//! Channel count and sample type are negotiated: mono and stereo are mapped
//! onto whatever the device offers and the callback converts from f32.
//!
//! Stopping flips an atomic flag (the callback goes silent and pending
//! writes bail out at their next poll) and tells the owner thread to drop
//! the stream. A stream error, or a device that stops pulling samples,
//! marks the track failed so nothing waits on it forever.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};

use super::{OutputDevice, OutputError, OutputTrack, TrackSpec, WriteMode};
use crate::audio::{decode_f32, RawAudioFormat};
use crate::lock;

/// How long a blocked write or drain sleeps between ring checks
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Extra wait after the ring empties, for audio still in the device buffer
const DRAIN_TAIL: Duration = Duration::from_millis(50);

/// Slack on top of the queued play time before `drain` gives up
const DRAIN_MARGIN: Duration = Duration::from_millis(500);

/// A blocked write with no playback progress for this long fails the track
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Smallest ring, in frames
const MIN_RING_FRAMES: usize = 256;

/// Names of the host's output devices
pub fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// First output device whose name contains `needle` (case-insensitive),
/// or the default device
fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, OutputError> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| OutputError::Device("no default output device".to_string()));
    };

    let wanted = needle.to_lowercase();
    let mut devices = host
        .output_devices()
        .map_err(|e| OutputError::Device(e.to_string()))?;
    devices
        .find(|d| {
            d.name()
                .map(|name| name.to_lowercase().contains(&wanted))
                .unwrap_or(false)
        })
        .ok_or_else(|| OutputError::Device(format!("no output device matched '{needle}'")))
}

/// Sample types the callback can produce, best first
fn sample_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I32 => Some(1),
        cpal::SampleFormat::I16 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        cpal::SampleFormat::U8 => Some(4),
        _ => None,
    }
}

/// Ordering key of a supported config range for `format`, lower is
/// better; `None` when the range cannot play it without resampling
fn config_rank(
    format: &RawAudioFormat,
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    sample_format: cpal::SampleFormat,
) -> Option<(u8, bool, u8)> {
    let rate = format.sample_rate();
    if rate < min_rate || rate > max_rate || channels == 0 {
        return None;
    }
    let format_rank = sample_format_rank(sample_format)?;
    let channel_rank = match channels {
        c if c == format.channels() => 0,
        c if c > format.channels() => 1,
        _ => 2,
    };
    let foreign = format.encoding().sample_format() != Some(sample_format);
    Some((channel_rank, foreign, format_rank))
}

/// Best supported output config for `format` at its own sample rate
fn pick_output_config(
    device: &cpal::Device,
    format: &RawAudioFormat,
) -> Result<cpal::SupportedStreamConfig, OutputError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| OutputError::Device(e.to_string()))?;

    ranges
        .filter_map(|range| {
            let rank = config_rank(
                format,
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0,
                range.sample_format(),
            )?;
            Some((rank, range))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, range)| range.with_sample_rate(cpal::SampleRate(format.sample_rate())))
        .ok_or_else(|| OutputError::Device(format!("device cannot play {format}")))
}

/// Sample for device channel `ch` from one source frame
fn map_channel(frame: &[f32], device_channels: usize, ch: usize) -> f32 {
    match (frame.len(), device_channels) {
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (1, _) => frame[0],
        _ => frame.get(ch).copied().unwrap_or(0.0),
    }
}

/// Ring size in samples for a track
fn ring_capacity(spec: &TrackSpec) -> usize {
    let channels = usize::from(spec.format.channels());
    let samples = spec.buffer_bytes / spec.format.bytes_per_sample_at_channel();
    samples.max(MIN_RING_FRAMES * channels)
}

/// State shared with the real-time callback
struct Shared {
    started: AtomicBool,
    stopped: AtomicBool,
    /// Set by the stream error callback or a stalled write
    failed: AtomicBool,
    /// f32 bits
    volume: AtomicU32,
    /// Samples the callback has taken from the ring
    played_samples: AtomicU64,
}

impl Shared {
    fn new(volume: f32) -> Self {
        Self {
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            played_samples: AtomicU64::new(0),
        }
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::Release);
    }
}

/// Output device backed by the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    device_name: Option<String>,
}

impl CpalOutput {
    /// `device_name` selects a device by substring; `None` uses the default
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputDevice for CpalOutput {
    fn open(&self, spec: &TrackSpec) -> Result<Arc<dyn OutputTrack>, OutputError> {
        let format = spec.format;
        log::info!(
            "Opening output: {} (usage {}, content type {})",
            format,
            spec.attributes.usage,
            spec.attributes.content_type
        );

        let capacity = ring_capacity(spec);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let shared = Arc::new(Shared::new(spec.volume));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), OutputError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let needle = self.device_name.clone();
        let callback_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("cpal-output".to_string())
            .spawn(move || {
                let stream = match build_stream(needle.as_deref(), &format, consumer, callback_shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until stopped or the track is dropped
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("Output stream closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(OutputError::Stream("output thread exited early".to_string()));
            }
        }

        Ok(Arc::new(CpalTrack {
            format,
            capacity,
            shared,
            queued_samples: AtomicU64::new(0),
            producer: Mutex::new(producer),
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(handle)),
        }))
    }
}

/// Negotiate a config for the segment's format, then build and start a
/// stream of the device's sample type
fn build_stream(
    needle: Option<&str>,
    format: &RawAudioFormat,
    consumer: ringbuf::HeapCons<f32>,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, OutputError> {
    let host = cpal::default_host();
    let device = pick_device(&host, needle)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = pick_output_config(&device, format)?;
    log::info!("Output config: {:?}", supported);
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = format.channels();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &config, channels, consumer, shared),
        cpal::SampleFormat::I32 => build_typed::<i32>(&device, &config, channels, consumer, shared),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &config, channels, consumer, shared),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &config, channels, consumer, shared),
        cpal::SampleFormat::U8 => build_typed::<u8>(&device, &config, channels, consumer, shared),
        other => Err(OutputError::Device(format!("Unsupported sample format: {:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| OutputError::Stream(e.to_string()))?;
    log::info!("Using output device: {}", device_name);
    Ok(stream)
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    source_channels: u16,
    mut consumer: ringbuf::HeapCons<f32>,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let device_channels = usize::from(config.channels);
    let source_channels = usize::from(source_channels);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    // Source samples popped from the ring; a trailing partial frame is
    // carried over to the next callback
    let mut pending: Vec<f32> = Vec::new();
    let mut held = 0usize;
    let error_shared = Arc::clone(&shared);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !shared.started.load(Ordering::Relaxed) || shared.stopped.load(Ordering::Relaxed)
                {
                    data.fill(silence);
                    return;
                }

                let frames = data.len() / device_channels;
                let wanted = (frames * source_channels).max(held);
                if pending.len() < wanted {
                    pending.resize(wanted, 0.0);
                }
                let popped = consumer.pop_slice(&mut pending[held..wanted]);
                shared
                    .played_samples
                    .fetch_add(popped as u64, Ordering::Release);

                let available = held + popped;
                let whole = available / source_channels;
                let volume = f32::from_bits(shared.volume.load(Ordering::Relaxed));
                for (frame, out) in data.chunks_mut(device_channels).enumerate() {
                    if frame >= whole {
                        // Underrun: pad with silence
                        out.fill(silence);
                        continue;
                    }
                    let source = &pending[frame * source_channels..(frame + 1) * source_channels];
                    for (ch, sample) in out.iter_mut().enumerate() {
                        let value = map_channel(source, device_channels, ch) * volume;
                        *sample = <T as cpal::Sample>::from_sample::<f32>(value);
                    }
                }

                held = available - whole * source_channels;
                pending.copy_within(whole * source_channels..available, 0);
            },
            move |err| {
                log::error!("Audio output error: {}", err);
                error_shared.fail();
            },
            None,
        )
        .map_err(|e| OutputError::Stream(e.to_string()))
}

struct CpalTrack {
    format: RawAudioFormat,
    /// Ring size in samples
    capacity: usize,
    shared: Arc<Shared>,
    /// Samples pushed into the ring
    queued_samples: AtomicU64,
    producer: Mutex<ringbuf::HeapProd<f32>>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalTrack {
    fn stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    fn failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    fn played(&self) -> u64 {
        self.shared.played_samples.load(Ordering::Acquire)
    }

    /// Sleep up to `duration` in poll steps, returning early on stop
    fn sleep_unless_stopped(&self, duration: Duration) {
        let mut remaining = duration;
        while !self.stopped() && remaining > Duration::ZERO {
            let step = remaining.min(POLL_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
    }

    fn stream_failed() -> OutputError {
        OutputError::Stream("output stream failed".to_string())
    }
}

impl OutputTrack for CpalTrack {
    fn write(&self, data: &[u8], mode: WriteMode) -> Result<usize, OutputError> {
        if self.failed() {
            return Err(Self::stream_failed());
        }

        let width = self.format.bytes_per_sample_at_channel();
        let mut producer = lock(&self.producer);
        let mut scratch = Vec::with_capacity(self.capacity.min(data.len() / width));
        let mut offset = 0;
        let mut last_played = self.played();
        let mut last_progress = Instant::now();

        while data.len() - offset >= width && !self.stopped() {
            let samples = ((data.len() - offset) / width).min(self.capacity);
            scratch.clear();
            decode_f32(
                self.format.encoding(),
                &data[offset..offset + samples * width],
                &mut scratch,
            );

            let mut queued = 0;
            while queued < scratch.len() {
                let pushed = producer.push_slice(&scratch[queued..]);
                queued += pushed;
                offset += pushed * width;
                self.queued_samples
                    .fetch_add(pushed as u64, Ordering::Release);
                if pushed > 0 {
                    continue;
                }
                if self.failed() {
                    return Err(Self::stream_failed());
                }
                // Ring full; nothing drains it before start
                if mode == WriteMode::NonBlocking
                    || !self.shared.started.load(Ordering::Acquire)
                    || self.stopped()
                {
                    return Ok(offset);
                }

                let played = self.played();
                if played != last_played {
                    last_played = played;
                    last_progress = Instant::now();
                } else if last_progress.elapsed() >= STALL_TIMEOUT {
                    log::error!("Output device stopped pulling samples");
                    self.shared.fail();
                    return Err(Self::stream_failed());
                }
                thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(offset)
    }

    fn start(&self) -> Result<(), OutputError> {
        if self.stopped() {
            return Err(OutputError::Stream("track already stopped".to_string()));
        }
        if self.failed() {
            return Err(Self::stream_failed());
        }
        self.shared.started.store(true, Ordering::Release);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.stopped() && !self.failed()
    }

    fn drain(&self) {
        let queued = self.queued_samples.load(Ordering::Acquire);
        let unplayed = queued.saturating_sub(self.played());
        let frames = unplayed / u64::from(self.format.channels());
        let deadline =
            Instant::now() + self.format.duration_of_frames(frames as usize) + DRAIN_MARGIN;

        while !self.stopped() && !self.failed() && self.played() < queued {
            if Instant::now() >= deadline {
                log::warn!(
                    "Output did not drain in time, {} samples left",
                    queued.saturating_sub(self.played())
                );
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
        if !self.failed() {
            self.sleep_unless_stopped(DRAIN_TAIL);
        }
    }

    fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(tx) = lock(&self.stop_tx).take() {
            let _ = tx.send(());
        }
        if let Some(handle) = lock(&self.thread).take() {
            if handle.join().is_err() {
                log::warn!("Output thread panicked");
            }
        }
    }

    fn close(&self) -> Result<(), OutputError> {
        self.stop();
        Ok(())
    }
}

impl Drop for CpalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
