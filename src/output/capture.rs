//! In-memory output sink
//!
//! Records everything written to it. With real-time pacing enabled, blocking
//! writes take as long as the audio they carry, which makes it usable as a
//! stand-in for a sound card when exercising `play`/`release` interplay.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{OutputDevice, OutputError, OutputTrack, TrackSpec, WriteMode};
use crate::lock;

#[derive(Default)]
struct CaptureLog {
    opened: Vec<TrackSpec>,
    data: Vec<u8>,
    closed: usize,
}

/// Output device that keeps the written PCM in memory
#[derive(Clone, Default)]
pub struct CaptureOutput {
    realtime: bool,
    fail_open: bool,
    log: Arc<Mutex<CaptureLog>>,
}

impl CaptureOutput {
    /// Sink that accepts every write immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose blocking writes and drains take real time
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::default()
        }
    }

    /// Sink whose `open` always fails
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Specs of every track opened so far
    pub fn opened(&self) -> Vec<TrackSpec> {
        lock(&self.log).opened.clone()
    }

    /// All bytes written across every track
    pub fn captured(&self) -> Vec<u8> {
        lock(&self.log).data.clone()
    }

    pub fn closed_tracks(&self) -> usize {
        lock(&self.log).closed
    }
}

impl OutputDevice for CaptureOutput {
    fn open(&self, spec: &TrackSpec) -> Result<Arc<dyn OutputTrack>, OutputError> {
        if self.fail_open {
            return Err(OutputError::Device("capture sink refused to open".to_string()));
        }
        lock(&self.log).opened.push(spec.clone());
        Ok(Arc::new(CaptureTrack {
            spec: spec.clone(),
            realtime: self.realtime,
            log: Arc::clone(&self.log),
            phase: Mutex::new(Phase::default()),
            wake: Condvar::new(),
        }))
    }
}

#[derive(Default)]
struct Phase {
    started: bool,
    stopped: bool,
    closed: bool,
}

struct CaptureTrack {
    spec: TrackSpec,
    realtime: bool,
    log: Arc<Mutex<CaptureLog>>,
    phase: Mutex<Phase>,
    wake: Condvar,
}

impl CaptureTrack {
    /// Sleep for the play time of `bytes`, returning early on stop
    fn wait_for(&self, bytes: usize) {
        let frames = bytes / self.spec.format.bytes_per_frame();
        let mut remaining = self.spec.format.duration_of_frames(frames);
        let mut phase = lock(&self.phase);
        while !phase.stopped && remaining > Duration::ZERO {
            let started = Instant::now();
            let (next, _) = self
                .wake
                .wait_timeout(phase, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            phase = next;
            remaining = remaining.saturating_sub(started.elapsed());
        }
    }
}

impl OutputTrack for CaptureTrack {
    fn write(&self, data: &[u8], mode: WriteMode) -> Result<usize, OutputError> {
        if lock(&self.phase).stopped {
            return Ok(0);
        }

        let chunk = self.spec.buffer_bytes.max(self.spec.format.bytes_per_frame());
        let accepted = match mode {
            WriteMode::NonBlocking => data.len().min(chunk),
            WriteMode::Blocking if self.realtime => data.len().min(chunk),
            WriteMode::Blocking => data.len(),
        };

        lock(&self.log).data.extend_from_slice(&data[..accepted]);
        if self.realtime && mode == WriteMode::Blocking {
            self.wait_for(accepted);
        }
        Ok(accepted)
    }

    fn start(&self) -> Result<(), OutputError> {
        let mut phase = lock(&self.phase);
        if phase.closed {
            return Err(OutputError::Stream("track already closed".to_string()));
        }
        phase.started = true;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        let phase = lock(&self.phase);
        phase.started && !phase.stopped
    }

    fn drain(&self) {
        if self.realtime {
            self.wait_for(self.spec.buffer_bytes);
        }
    }

    fn stop(&self) {
        lock(&self.phase).stopped = true;
        self.wake.notify_all();
    }

    fn close(&self) -> Result<(), OutputError> {
        self.stop();
        let mut phase = lock(&self.phase);
        if !phase.closed {
            phase.closed = true;
            lock(&self.log).closed += 1;
        }
        Ok(())
    }
}
