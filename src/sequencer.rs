//! Sequencer state machine
//!
//! [`Sequencer`] owns an ordered list of segments and walks it through a
//! fixed lifecycle:
//!
//! ```text
//! Init --add_sequence--> Init
//! Init --prepare--> Prepared
//! Prepared --play--> Playing --(play_once returns)--> Prepared
//! {Init, Prepared, Playing} --release--> Released
//! ```
//!
//! What "building", "playing" and "cleaning up" actually mean is supplied
//! by a [`PlaybackStrategy`]. The sequencer only guarantees that the hooks
//! run in a legal order and that the lifecycle state stays consistent.
//!
//! ## Threading
//!
//! Every operation takes `&self`. `play` blocks its caller for the whole
//! playback, so the one supported concurrent pattern is a second thread
//! calling `release` while the first is still inside `play`. The state is
//! an atomic cell and every transition out of `Playing` is a
//! compare-and-swap, so a `play` that finishes after a concurrent `release`
//! cannot resurrect the instance. It is the strategy's `cleanup` that has
//! to unblock a running `play_once` (typically by stopping the device).

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::lock;
use crate::output::OutputError;

/// Usage value for media playback (the default)
pub const USAGE_MEDIA: i32 = 1;

/// Content type value for unknown content (the default)
pub const CONTENT_TYPE_UNKNOWN: i32 = 0;

/// Errors returned by [`Sequencer`] operations
#[derive(Error, Debug)]
pub enum SequencerError {
    /// The operation is not legal in the current lifecycle state
    #[error("{operation} not allowed in state {state}: {reason}")]
    InvalidState {
        operation: &'static str,
        state: SequencerState,
        reason: &'static str,
    },

    /// A strategy hook failed
    #[error("Unexpected playback failure: {0}")]
    Unexpected(#[from] OutputError),
}

impl SequencerError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SequencerError::InvalidState { .. })
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SequencerState {
    Init = 0,
    Prepared = 1,
    Playing = 2,
    Released = 3,
}

impl SequencerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SequencerState::Init,
            1 => SequencerState::Prepared,
            2 => SequencerState::Playing,
            _ => SequencerState::Released,
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequencerState::Init => "Init",
            SequencerState::Prepared => "Prepared",
            SequencerState::Playing => "Playing",
            SequencerState::Released => "Released",
        };
        f.write_str(name)
    }
}

/// Usage and content-type classification forwarded to the output device.
///
/// The values are opaque here; their meaning belongs to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioAttributes {
    pub usage: i32,
    pub content_type: i32,
}

impl Default for AudioAttributes {
    fn default() -> Self {
        Self {
            usage: USAGE_MEDIA,
            content_type: CONTENT_TYPE_UNKNOWN,
        }
    }
}

/// The three points of variation of a sequencer.
///
/// Implementations use interior mutability: `cleanup` may run on another
/// thread while `play_once` is blocked.
pub trait PlaybackStrategy {
    /// One segment of the sequence. Never inspected by the sequencer.
    type Item;

    /// Turn the ordered segment list into a ready-to-play form.
    ///
    /// Called once, from `prepare`. On error, anything already acquired
    /// must still be reachable by `cleanup`.
    fn build_playable(
        &self,
        items: &[Self::Item],
        attributes: AudioAttributes,
    ) -> Result<(), OutputError>;

    /// Play the prepared sequence once, blocking until it finishes or is
    /// stopped by `cleanup`.
    fn play_once(&self, attributes: AudioAttributes) -> Result<(), OutputError>;

    /// Release everything acquired by the other two hooks.
    ///
    /// Must cope with `build_playable` never having run, and must make a
    /// concurrently blocked `play_once` return.
    fn cleanup(&self);
}

/// Segment list plus whether the build hook has consumed it
struct Segments<T> {
    items: Vec<T>,
    sealed: bool,
}

/// Plays an ordered list of segments through a [`PlaybackStrategy`]
pub struct Sequencer<S: PlaybackStrategy> {
    strategy: S,

    /// Guards list mutation and serialises add/prepare/release
    segments: Mutex<Segments<S::Item>>,

    /// `SequencerState` as u8
    state: AtomicU8,

    audio_usage: AtomicI32,
    content_type: AtomicI32,
}

impl<S: PlaybackStrategy> Sequencer<S> {
    /// Create a sequencer in `Init` with an empty segment list
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            segments: Mutex::new(Segments {
                items: Vec::new(),
                sealed: false,
            }),
            state: AtomicU8::new(SequencerState::Init as u8),
            audio_usage: AtomicI32::new(USAGE_MEDIA),
            content_type: AtomicI32::new(CONTENT_TYPE_UNKNOWN),
        }
    }

    pub fn audio_usage(&self) -> i32 {
        self.audio_usage.load(Ordering::Relaxed)
    }

    pub fn set_audio_usage(&self, usage: i32) {
        self.audio_usage.store(usage, Ordering::Relaxed);
    }

    pub fn content_type(&self) -> i32 {
        self.content_type.load(Ordering::Relaxed)
    }

    pub fn set_content_type(&self, content_type: i32) {
        self.content_type.store(content_type, Ordering::Relaxed);
    }

    /// Current classification values as handed to the strategy hooks
    pub fn attributes(&self) -> AudioAttributes {
        AudioAttributes {
            usage: self.audio_usage(),
            content_type: self.content_type(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SequencerState {
        SequencerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of segments appended so far
    pub fn len(&self) -> usize {
        lock(&self.segments).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Append a segment to the end of the sequence.
    ///
    /// Only legal in `Init`, before `prepare` has handed the list to the
    /// strategy.
    pub fn add_sequence(&self, item: S::Item) -> Result<(), SequencerError> {
        let mut segments = lock(&self.segments);
        self.expect_state("add_sequence", SequencerState::Init)?;
        if segments.sealed {
            return Err(SequencerError::InvalidState {
                operation: "add_sequence",
                state: self.state(),
                reason: "sequence already handed to prepare",
            });
        }
        segments.items.push(item);
        Ok(())
    }

    /// Build the playable form of the sequence.
    ///
    /// Runs the strategy's build hook at most once. If the hook fails the
    /// instance stays in `Init`, the sequence is sealed and the only
    /// remaining useful call is `release`.
    pub fn prepare(&self) -> Result<(), SequencerError> {
        let mut segments = lock(&self.segments);
        self.expect_state("prepare", SequencerState::Init)?;
        if segments.sealed {
            return Err(SequencerError::InvalidState {
                operation: "prepare",
                state: SequencerState::Init,
                reason: "a previous prepare already ran",
            });
        }
        if segments.items.is_empty() {
            return Err(SequencerError::InvalidState {
                operation: "prepare",
                state: SequencerState::Init,
                reason: "no segments to play",
            });
        }

        segments.sealed = true;
        log::debug!("prepare: building {} segment(s)", segments.items.len());
        self.strategy
            .build_playable(&segments.items, self.attributes())?;

        // release takes the segment lock too, so Init cannot have changed
        self.transition("prepare", SequencerState::Init, SequencerState::Prepared)?;
        log::debug!("prepare: complete");
        Ok(())
    }

    /// Play the whole sequence once, blocking the calling thread.
    ///
    /// May be called again after it returns. The state is back to
    /// `Prepared` on every exit path, unless `release` ran meanwhile.
    pub fn play(&self) -> Result<(), SequencerError> {
        self.transition("play", SequencerState::Prepared, SequencerState::Playing)?;
        let _playing = PlayingGuard { state: &self.state };

        self.strategy.play_once(self.attributes())?;
        log::debug!("play: complete");
        Ok(())
    }

    /// Free everything and pin the state to `Released`.
    ///
    /// Safe to call from any thread, including while another thread is
    /// blocked in `play`. Calls after the first are no-ops.
    pub fn release(&self) {
        let mut segments = lock(&self.segments);
        let previous = self
            .state
            .swap(SequencerState::Released as u8, Ordering::AcqRel);
        let previous = SequencerState::from_u8(previous);
        if previous == SequencerState::Released {
            return;
        }

        log::debug!("release: from {}", previous);
        self.strategy.cleanup();
        segments.items.clear();
        segments.sealed = true;
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: SequencerState,
    ) -> Result<(), SequencerError> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(SequencerError::InvalidState {
                operation,
                state,
                reason: "wrong lifecycle state",
            })
        }
    }

    fn transition(
        &self,
        operation: &'static str,
        from: SequencerState,
        to: SequencerState,
    ) -> Result<(), SequencerError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| SequencerError::InvalidState {
                operation,
                state: SequencerState::from_u8(actual),
                reason: "wrong lifecycle state",
            })
    }
}

impl<S: PlaybackStrategy> Drop for Sequencer<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Puts `Playing` back to `Prepared` when `play` exits, panics included
struct PlayingGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for PlayingGuard<'_> {
    fn drop(&mut self) {
        // Fails harmlessly when a concurrent release already won
        let _ = self.state.compare_exchange(
            SequencerState::Playing as u8,
            SequencerState::Prepared as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Arc, Condvar};
    use std::thread;
    use std::time::Duration;

    /// Strategy that counts hook calls and can fail or block on demand
    #[derive(Default)]
    struct ScriptedStrategy {
        builds: AtomicUsize,
        plays: AtomicUsize,
        cleanups: AtomicUsize,
        built_len: AtomicUsize,
        fail_build: AtomicBool,
        fail_play: AtomicBool,
        panic_play: AtomicBool,
        block_play: AtomicBool,
        seen: Mutex<Vec<AudioAttributes>>,
        stopped: Mutex<bool>,
        wake: Condvar,
    }

    impl PlaybackStrategy for ScriptedStrategy {
        type Item = u32;

        fn build_playable(
            &self,
            items: &[u32],
            attributes: AudioAttributes,
        ) -> Result<(), OutputError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(attributes);
            if self.fail_build.load(Ordering::SeqCst) {
                return Err(OutputError::Device("open failed".to_string()));
            }
            self.built_len.store(items.len(), Ordering::SeqCst);
            Ok(())
        }

        fn play_once(&self, attributes: AudioAttributes) -> Result<(), OutputError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(attributes);
            if self.panic_play.load(Ordering::SeqCst) {
                panic!("device exploded");
            }
            if self.fail_play.load(Ordering::SeqCst) {
                return Err(OutputError::Stream("write failed".to_string()));
            }
            if self.block_play.load(Ordering::SeqCst) {
                let mut stopped = self.stopped.lock().unwrap();
                while !*stopped {
                    stopped = self.wake.wait(stopped).unwrap();
                }
            }
            Ok(())
        }

        fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            *self.stopped.lock().unwrap() = true;
            self.wake.notify_all();
        }
    }

    fn sequencer_with(items: &[u32]) -> Sequencer<ScriptedStrategy> {
        let sequencer = Sequencer::new(ScriptedStrategy::default());
        for &item in items {
            sequencer.add_sequence(item).unwrap();
        }
        sequencer
    }

    fn wait_for_state(sequencer: &Sequencer<ScriptedStrategy>, state: SequencerState) {
        for _ in 0..500 {
            if sequencer.state() == state {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("never reached {state}");
    }

    #[test]
    fn test_full_lifecycle() {
        let sequencer = sequencer_with(&[1, 2, 3]);
        assert_eq!(sequencer.state(), SequencerState::Init);
        assert_eq!(sequencer.len(), 3);

        sequencer.prepare().unwrap();
        assert_eq!(sequencer.state(), SequencerState::Prepared);
        assert_eq!(sequencer.strategy().built_len.load(Ordering::SeqCst), 3);

        sequencer.play().unwrap();
        sequencer.play().unwrap();
        assert_eq!(sequencer.state(), SequencerState::Prepared);
        assert_eq!(sequencer.strategy().plays.load(Ordering::SeqCst), 2);

        sequencer.release();
        assert_eq!(sequencer.state(), SequencerState::Released);
        assert!(sequencer.play().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.strategy().plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_add_after_prepare_is_rejected() {
        let sequencer = sequencer_with(&[1]);
        sequencer.prepare().unwrap();

        let err = sequencer.add_sequence(2).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(sequencer.len(), 1);
        assert_eq!(sequencer.state(), SequencerState::Prepared);
    }

    #[test]
    fn test_prepare_with_no_segments() {
        let sequencer = sequencer_with(&[]);
        assert!(sequencer.prepare().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.state(), SequencerState::Init);
        assert_eq!(sequencer.strategy().builds.load(Ordering::SeqCst), 0);

        // Entry checks never seal the list
        sequencer.add_sequence(7).unwrap();
        sequencer.prepare().unwrap();
        assert_eq!(sequencer.state(), SequencerState::Prepared);
    }

    #[test]
    fn test_prepare_twice_is_rejected() {
        let sequencer = sequencer_with(&[1]);
        sequencer.prepare().unwrap();
        assert!(sequencer.prepare().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.state(), SequencerState::Prepared);
        assert_eq!(sequencer.strategy().builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_play_before_prepare_is_rejected() {
        let sequencer = sequencer_with(&[1]);
        let err = sequencer.play().unwrap_err();
        match err {
            SequencerError::InvalidState { operation, state, .. } => {
                assert_eq!(operation, "play");
                assert_eq!(state, SequencerState::Init);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sequencer.strategy().plays.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_build_leaves_init_and_is_releasable() {
        let sequencer = sequencer_with(&[1, 2]);
        sequencer.strategy().fail_build.store(true, Ordering::SeqCst);

        let err = sequencer.prepare().unwrap_err();
        assert!(matches!(err, SequencerError::Unexpected(OutputError::Device(_))));
        assert_eq!(sequencer.state(), SequencerState::Init);

        // The build hook ran once; it does not get a second go
        sequencer.strategy().fail_build.store(false, Ordering::SeqCst);
        assert!(sequencer.prepare().unwrap_err().is_invalid_state());
        assert!(sequencer.add_sequence(3).unwrap_err().is_invalid_state());
        assert!(sequencer.play().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.strategy().builds.load(Ordering::SeqCst), 1);

        sequencer.release();
        assert_eq!(sequencer.state(), SequencerState::Released);
        assert_eq!(sequencer.strategy().cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_play_reverts_to_prepared() {
        let sequencer = sequencer_with(&[1]);
        sequencer.prepare().unwrap();
        sequencer.strategy().fail_play.store(true, Ordering::SeqCst);

        let err = sequencer.play().unwrap_err();
        assert!(matches!(err, SequencerError::Unexpected(OutputError::Stream(_))));
        assert_eq!(sequencer.state(), SequencerState::Prepared);

        sequencer.strategy().fail_play.store(false, Ordering::SeqCst);
        sequencer.play().unwrap();
    }

    #[test]
    fn test_panicking_play_reverts_to_prepared() {
        let sequencer = sequencer_with(&[1]);
        sequencer.prepare().unwrap();
        sequencer.strategy().panic_play.store(true, Ordering::SeqCst);

        let result = panic::catch_unwind(AssertUnwindSafe(|| sequencer.play()));
        assert!(result.is_err());
        assert_eq!(sequencer.state(), SequencerState::Prepared);
    }

    #[test]
    fn test_release_is_idempotent() {
        let sequencer = sequencer_with(&[1]);
        sequencer.prepare().unwrap();
        sequencer.release();
        sequencer.release();
        assert_eq!(sequencer.state(), SequencerState::Released);
        assert_eq!(sequencer.strategy().cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(sequencer.len(), 0);
    }

    #[test]
    fn test_release_before_prepare() {
        let sequencer = sequencer_with(&[1, 2]);
        sequencer.release();
        assert_eq!(sequencer.strategy().cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(sequencer.strategy().builds.load(Ordering::SeqCst), 0);
        assert!(sequencer.add_sequence(3).unwrap_err().is_invalid_state());
        assert!(sequencer.prepare().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.state(), SequencerState::Released);
    }

    #[test]
    fn test_release_during_blocking_play() {
        let sequencer = Arc::new(sequencer_with(&[1, 2, 3]));
        sequencer.prepare().unwrap();
        sequencer.strategy().block_play.store(true, Ordering::SeqCst);

        let player = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.play())
        };

        wait_for_state(&sequencer, SequencerState::Playing);
        sequencer.release();

        let result = player.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(sequencer.state(), SequencerState::Released);
        assert_eq!(sequencer.strategy().cleanups.load(Ordering::SeqCst), 1);
        assert!(sequencer.play().unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_concurrent_releases_clean_up_once() {
        let sequencer = Arc::new(sequencer_with(&[1]));
        sequencer.prepare().unwrap();
        sequencer.strategy().block_play.store(true, Ordering::SeqCst);

        let player = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.play())
        };
        wait_for_state(&sequencer, SequencerState::Playing);

        let releasers: Vec<_> = (0..8)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                thread::spawn(move || sequencer.release())
            })
            .collect();
        for handle in releasers {
            handle.join().unwrap();
        }
        player.join().unwrap().unwrap();

        assert_eq!(sequencer.state(), SequencerState::Released);
        assert_eq!(sequencer.strategy().cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attributes_reach_hooks() {
        let sequencer = sequencer_with(&[1]);
        assert_eq!(sequencer.attributes(), AudioAttributes::default());

        sequencer.set_audio_usage(5);
        sequencer.set_content_type(2);
        sequencer.prepare().unwrap();
        sequencer.set_audio_usage(13);
        sequencer.play().unwrap();

        let seen = sequencer.strategy().seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                AudioAttributes { usage: 5, content_type: 2 },
                AudioAttributes { usage: 13, content_type: 2 },
            ]
        );
    }

    #[test]
    fn test_accessors_work_after_release() {
        let sequencer = sequencer_with(&[]);
        sequencer.release();
        sequencer.set_audio_usage(4);
        sequencer.set_content_type(1);
        assert_eq!(sequencer.audio_usage(), 4);
        assert_eq!(sequencer.content_type(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let counter = Arc::new(AtomicUsize::new(0));
        struct Counting(Arc<AtomicUsize>);
        impl PlaybackStrategy for Counting {
            type Item = ();
            fn build_playable(&self, _: &[()], _: AudioAttributes) -> Result<(), OutputError> {
                Ok(())
            }
            fn play_once(&self, _: AudioAttributes) -> Result<(), OutputError> {
                Ok(())
            }
            fn cleanup(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let sequencer = Sequencer::new(Counting(Arc::clone(&counter)));
        sequencer.add_sequence(()).unwrap();
        drop(sequencer);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let sequencer = Sequencer::new(Counting(Arc::clone(&counter)));
        sequencer.release();
        drop(sequencer);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_state_visible_from_other_thread_while_playing() {
        let sequencer = Arc::new(sequencer_with(&[1]));
        sequencer.prepare().unwrap();
        sequencer.strategy().block_play.store(true, Ordering::SeqCst);

        let player = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.play())
        };
        wait_for_state(&sequencer, SequencerState::Playing);
        assert!(sequencer.play().unwrap_err().is_invalid_state());
        assert!(sequencer.prepare().unwrap_err().is_invalid_state());
        assert_eq!(sequencer.state(), SequencerState::Playing);

        sequencer.release();
        player.join().unwrap().unwrap();
        assert_eq!(sequencer.state(), SequencerState::Released);
    }

    /// Strategy whose build waits for `open` and logs hook order
    #[derive(Default)]
    struct LatchedBuild {
        events: Mutex<Vec<&'static str>>,
        open: Mutex<bool>,
        opened: Condvar,
    }

    impl LatchedBuild {
        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }

        fn open_latch(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    impl PlaybackStrategy for LatchedBuild {
        type Item = u32;

        fn build_playable(&self, _: &[u32], _: AudioAttributes) -> Result<(), OutputError> {
            self.events.lock().unwrap().push("build started");
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            self.events.lock().unwrap().push("build finished");
            Ok(())
        }

        fn play_once(&self, _: AudioAttributes) -> Result<(), OutputError> {
            Ok(())
        }

        fn cleanup(&self) {
            self.events.lock().unwrap().push("cleanup");
        }
    }

    #[test]
    fn test_release_waits_for_running_prepare() {
        let sequencer = Arc::new(Sequencer::new(LatchedBuild::default()));
        sequencer.add_sequence(1).unwrap();

        let preparer = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.prepare())
        };
        for _ in 0..500 {
            if !sequencer.strategy().events().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(sequencer.strategy().events(), vec!["build started"]);

        let releaser = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.release())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!releaser.is_finished());
        assert_eq!(sequencer.strategy().events(), vec!["build started"]);
        assert_eq!(sequencer.state(), SequencerState::Init);

        sequencer.strategy().open_latch();
        preparer.join().unwrap().unwrap();
        releaser.join().unwrap();

        assert_eq!(
            sequencer.strategy().events(),
            vec!["build started", "build finished", "cleanup"]
        );
        assert_eq!(sequencer.state(), SequencerState::Released);

        sequencer.release();
        assert_eq!(sequencer.strategy().events().len(), 3);
    }
}
