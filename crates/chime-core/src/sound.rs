//! Sound controller: playback state machine and completion handling.
//!
//! A [`Sound`] owns the playback state of one resource and drives a
//! [`SoundBackend`]. Transitions:
//!
//! ```text
//! play   : any state                  -> Playing
//! pause  : Playing | EndOfIteration   -> Paused     (else NotPlaying)
//! stop   : Playing | Paused | EndOfIt -> Stopped    (Stopped: no-op)
//! end    : (backend notification)     -> EndOfIteration [-> Playing if looping]
//! ```
//!
//! Every operation, and the completion sequence delivered by the backend,
//! runs under one reentrant lock per sound. Reentrancy lets a completion
//! handler call back into the same sound (e.g. `stop()`) while the
//! sequence is in progress. Mutable fields sit in a `RefCell` inside the
//! lock and are never borrowed across a backend or handler call.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::ReentrantMutex;

use crate::backend::SoundBackend;
use crate::config::SoundConfig;
use crate::diagnostics::{DiagnosticSink, LogSink, DEFAULT_CATEGORY};
use crate::error::{Result, SoundError};
use crate::models::{PlaybackState, SoundCommand, SoundStatus};
use crate::resolve::{LocatorResolver, UrlResolver};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Called once per finished iteration with the current looping flag.
pub type CompletionHandler = Arc<dyn Fn(bool) -> HandlerResult + Send + Sync>;

// ---------------------------------------------------------------------------
// Sound
// ---------------------------------------------------------------------------

/// Handle to a controlled sound. Clones share the same sound.
#[derive(Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

/// Non-owning handle; what a completion handler should capture.
#[derive(Clone)]
pub struct WeakSound {
    inner: Weak<SoundInner>,
}

/// Handed to the backend on `load`; reports natural end of media.
#[derive(Clone)]
pub struct IterationNotifier {
    inner: Weak<SoundInner>,
}

struct SoundInner {
    locator: String,
    backend: Arc<dyn SoundBackend>,
    resolver: Arc<dyn LocatorResolver>,
    diagnostics: Arc<dyn DiagnosticSink>,
    category: String,
    core: ReentrantMutex<RefCell<Core>>,
}

struct Core {
    path: PathBuf,
    state: PlaybackState,
    looping: bool,
    loaded: bool,
    on_complete: Option<CompletionHandler>,
}

impl Sound {
    /// Sound for `locator`, resolved with [`UrlResolver`] and reporting to the log.
    pub fn new(locator: impl Into<String>, backend: Arc<dyn SoundBackend>) -> Result<Self> {
        Self::with_parts(
            locator,
            backend,
            Arc::new(UrlResolver::default()),
            Arc::new(LogSink),
        )
    }

    /// Sound with explicit collaborators.
    pub fn with_parts(
        locator: impl Into<String>,
        backend: Arc<dyn SoundBackend>,
        resolver: Arc<dyn LocatorResolver>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        Self::build(locator.into(), backend, resolver, diagnostics, DEFAULT_CATEGORY.into())
    }

    /// Sound set up from `config`: resolver root, initial volume and looping.
    pub fn from_config(
        locator: impl Into<String>,
        backend: Arc<dyn SoundBackend>,
        config: &SoundConfig,
    ) -> Result<Self> {
        let sound = Self::build(
            locator.into(),
            backend,
            Arc::new(UrlResolver::new(config.resource_root.clone())),
            Arc::new(LogSink),
            config.diagnostic_category.clone(),
        )?;
        sound.set_volume(config.volume);
        sound.set_looping(config.looping);
        Ok(sound)
    }

    fn build(
        locator: String,
        backend: Arc<dyn SoundBackend>,
        resolver: Arc<dyn LocatorResolver>,
        diagnostics: Arc<dyn DiagnosticSink>,
        category: String,
    ) -> Result<Self> {
        let path = resolver.resolve(&locator)?;
        log::debug!("chime: {} resolved to {}", locator, path.display());
        Ok(Self {
            inner: Arc::new(SoundInner {
                locator,
                backend,
                resolver,
                diagnostics,
                category,
                core: ReentrantMutex::new(RefCell::new(Core {
                    path,
                    state: PlaybackState::Stopped,
                    looping: false,
                    loaded: false,
                    on_complete: None,
                })),
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Start or resume playback. Loads the resource first if needed.
    ///
    /// Fails only when the backend does; the state is then unchanged.
    pub fn play(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        if !self.is_loaded() {
            self.load()?;
        }
        self.inner.backend.start()?;
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Pause a playing sound. Stopped or already paused sounds fail with
    /// [`SoundError::NotPlaying`].
    pub fn pause(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        if !self.state().is_in_motion() {
            return Err(SoundError::NotPlaying);
        }
        self.inner.backend.pause()?;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Stop playback. Idempotent.
    pub fn stop(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        if self.state() != PlaybackState::Stopped {
            self.inner.backend.stop()?;
        }
        self.set_state(PlaybackState::Stopped);
        Ok(())
    }

    /// Acquire the backend resource, releasing any previous one first.
    pub fn load(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        self.unload()?;
        let path = self.path();
        self.inner.backend.load(&path, self.notifier())?;
        self.inner.core.lock().borrow_mut().loaded = true;
        log::debug!("chime: loaded {}", path.display());
        Ok(())
    }

    /// Stop, then release the backend resource if one is held.
    pub fn unload(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        self.stop()?;
        if self.is_loaded() {
            self.inner.backend.unload()?;
            self.inner.core.lock().borrow_mut().loaded = false;
        }
        Ok(())
    }

    /// Unload, re-resolve the same locator, and load again.
    pub fn reload(&self) -> Result<()> {
        let _serial = self.inner.core.lock();
        self.unload()?;
        let path = self.inner.resolver.resolve(&self.inner.locator)?;
        self.inner.core.lock().borrow_mut().path = path;
        self.load()
    }

    /// Set the volume, clamped to [0.0, 1.0]. NaN is treated as silence.
    pub fn set_volume(&self, volume: f64) {
        let _serial = self.inner.core.lock();
        self.inner.backend.set_volume(clamp_volume(volume));
    }

    /// Current volume as reported by the backend.
    pub fn volume(&self) -> f64 {
        let _serial = self.inner.core.lock();
        clamp_volume(self.inner.backend.volume())
    }

    pub fn set_looping(&self, looping: bool) {
        self.inner.core.lock().borrow_mut().looping = looping;
    }

    /// Replace the completion handler. `None` removes it.
    ///
    /// A notification already dispatching keeps the handler it started with.
    pub fn set_on_complete(&self, handler: Option<CompletionHandler>) {
        self.inner.core.lock().borrow_mut().on_complete = handler;
    }

    /// Closure form of [`set_on_complete`](Self::set_on_complete).
    pub fn on_complete<F>(&self, handler: F)
    where
        F: Fn(bool) -> HandlerResult + Send + Sync + 'static,
    {
        self.set_on_complete(Some(Arc::new(handler)));
    }

    /// Dispatch a command value onto the matching operation.
    pub fn apply(&self, cmd: SoundCommand) -> Result<()> {
        match cmd {
            SoundCommand::Play => self.play(),
            SoundCommand::Pause => self.pause(),
            SoundCommand::Stop => self.stop(),
            SoundCommand::Reload => self.reload(),
            SoundCommand::SetVolume { volume } => {
                self.set_volume(volume);
                Ok(())
            }
            SoundCommand::SetLooping { looping } => {
                self.set_looping(looping);
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.inner.core.lock().borrow().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn is_looping(&self) -> bool {
        self.inner.core.lock().borrow().looping
    }

    /// True while the backend holds the resource.
    pub fn is_loaded(&self) -> bool {
        self.inner.core.lock().borrow().loaded
    }

    pub fn locator(&self) -> &str {
        &self.inner.locator
    }

    /// Local path the locator resolved to (as of the last reload).
    pub fn path(&self) -> PathBuf {
        self.inner.core.lock().borrow().path.clone()
    }

    pub fn status(&self) -> SoundStatus {
        let guard = self.inner.core.lock();
        let volume = self.volume();
        let core = guard.borrow();
        SoundStatus {
            locator: self.inner.locator.clone(),
            path: core.path.clone(),
            state: core.state,
            looping: core.looping,
            volume,
            loaded: core.loaded,
        }
    }

    /// Notifier for this sound, as given to the backend on `load`.
    pub fn notifier(&self) -> IterationNotifier {
        IterationNotifier {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn downgrade(&self) -> WeakSound {
        WeakSound {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // -----------------------------------------------------------------------
    // Completion sequence
    // -----------------------------------------------------------------------

    /// Caller must hold the serialization lock.
    fn complete_iteration(&self) {
        self.set_state(PlaybackState::EndOfIteration);

        let (handler, looping) = {
            let guard = self.inner.core.lock();
            let core = guard.borrow();
            (core.on_complete.clone(), core.looping)
        };
        if let Some(handler) = handler {
            self.dispatch_completion(&handler, looping);
        }

        // The handler may have stopped the sound or turned looping off
        if self.is_looping() && self.state() != PlaybackState::Stopped {
            log_err(self.restart_iteration(), "loop restart");
        }
    }

    fn restart_iteration(&self) -> Result<()> {
        self.stop()?;
        self.play()?;
        // Only observable if something changed the state between play() and here.
        if self.state() == PlaybackState::Paused {
            self.pause()?;
        }
        Ok(())
    }

    fn dispatch_completion(&self, handler: &CompletionHandler, looping: bool) {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| handler(looping))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.report(&format!("Error during sound onComplete callback: {}", failure));
    }

    fn report(&self, message: &str) {
        self.inner.diagnostics.error(&self.inner.category, message);
    }

    fn set_state(&self, state: PlaybackState) {
        let guard = self.inner.core.lock();
        let mut core = guard.borrow_mut();
        if core.state != state {
            log::trace!("chime: {} {:?} -> {:?}", self.inner.locator, core.state, state);
        }
        core.state = state;
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("locator", &self.inner.locator)
            .field("state", &self.state())
            .finish()
    }
}

impl WeakSound {
    pub fn upgrade(&self) -> Option<Sound> {
        self.inner.upgrade().map(|inner| Sound { inner })
    }
}

impl fmt::Debug for WeakSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSound")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

impl IterationNotifier {
    /// Run the completion sequence for one finished iteration.
    pub fn iteration_complete(&self) {
        self.iteration_complete_if(|| true);
    }

    /// Like [`iteration_complete`](Self::iteration_complete), but first asks
    /// `still_current` while holding the sound's lock; nothing happens if it
    /// returns false. Lets a backend drop a notification that raced a stop.
    pub fn iteration_complete_if(&self, still_current: impl FnOnce() -> bool) {
        let Some(inner) = self.inner.upgrade() else {
            log::debug!("chime: iteration end for a dropped sound");
            return;
        };
        let sound = Sound { inner };
        let _serial = sound.inner.core.lock();
        if !still_current() {
            log::debug!("chime: stale iteration end for {}", sound.inner.locator);
            return;
        }
        sound.complete_iteration();
    }

    /// False once the sound has been dropped.
    pub fn is_attached(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for IterationNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterationNotifier")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

impl Drop for SoundInner {
    fn drop(&mut self) {
        let (loaded, state) = {
            let core = self.core.get_mut().get_mut();
            (core.loaded, core.state)
        };
        if !loaded {
            return;
        }
        if state != PlaybackState::Stopped {
            log_err(self.backend.stop(), "stop on drop");
        }
        log_err(self.backend.unload(), "unload on drop");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Log errors from backend operations without panicking.
fn log_err<T, E: fmt::Display>(result: std::result::Result<T, E>, context: &str) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            log::warn!("chime: {} failed: {}", context, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{BackendCall, RecordingBackend};
    use crate::diagnostics::MemorySink;
    use crate::error::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fixture() -> (Arc<RecordingBackend>, Arc<MemorySink>, Sound) {
        let backend = Arc::new(RecordingBackend::new());
        let sink = Arc::new(MemorySink::new());
        let sound = Sound::with_parts(
            "sounds/beep.wav",
            backend.clone(),
            Arc::new(UrlResolver::default()),
            sink.clone(),
        )
        .unwrap();
        (backend, sink, sound)
    }

    #[test]
    fn starts_stopped_and_unloaded() {
        let (backend, _, sound) = fixture();
        assert_eq!(sound.state(), PlaybackState::Stopped);
        assert!(!sound.is_looping());
        assert!(!sound.is_loaded());
        assert!((0.0..=1.0).contains(&sound.volume()));
        assert_eq!(sound.path(), PathBuf::from("sounds/beep.wav"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn first_play_loads_then_starts() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        assert!(sound.is_playing());
        assert!(sound.is_loaded());
        assert_eq!(backend.calls(), vec![BackendCall::Load, BackendCall::Start]);
        assert_eq!(backend.loaded_path(), Some(PathBuf::from("sounds/beep.wav")));

        backend.clear_calls();
        sound.play().unwrap();
        assert_eq!(backend.calls(), vec![BackendCall::Start]);
    }

    #[test]
    fn play_from_every_state_ends_playing() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        sound.pause().unwrap();
        sound.play().unwrap();
        assert!(sound.is_playing());

        sound.stop().unwrap();
        sound.play().unwrap();
        assert!(sound.is_playing());

        backend.finish_iteration();
        assert_eq!(sound.state(), PlaybackState::EndOfIteration);
        sound.play().unwrap();
        assert!(sound.is_playing());
    }

    #[test]
    fn pause_requires_motion() {
        let (backend, _, sound) = fixture();
        assert!(matches!(sound.pause(), Err(SoundError::NotPlaying)));
        assert_eq!(sound.state(), PlaybackState::Stopped);

        sound.play().unwrap();
        sound.pause().unwrap();
        assert!(sound.is_paused());
        assert!(matches!(sound.pause(), Err(SoundError::NotPlaying)));
        assert!(sound.is_paused());
        assert_eq!(backend.count(BackendCall::Pause), 1);
    }

    #[test]
    fn pause_allowed_at_end_of_iteration() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        backend.finish_iteration();
        sound.pause().unwrap();
        assert!(sound.is_paused());
    }

    #[test]
    fn stop_is_idempotent() {
        let (backend, _, sound) = fixture();
        sound.stop().unwrap();
        assert_eq!(sound.state(), PlaybackState::Stopped);
        assert_eq!(backend.count(BackendCall::Stop), 0);

        sound.play().unwrap();
        sound.stop().unwrap();
        sound.stop().unwrap();
        assert_eq!(backend.count(BackendCall::Stop), 1);
    }

    #[test]
    fn volume_is_clamped() {
        let (_, _, sound) = fixture();
        sound.set_volume(1.7);
        assert_eq!(sound.volume(), 1.0);
        sound.set_volume(-3.0);
        assert_eq!(sound.volume(), 0.0);
        sound.set_volume(0.3);
        assert_eq!(sound.volume(), 0.3);
        sound.set_volume(f64::NAN);
        assert_eq!(sound.volume(), 0.0);
        sound.set_volume(f64::INFINITY);
        assert_eq!(sound.volume(), 1.0);
    }

    #[test]
    fn looping_flag_makes_no_backend_call() {
        let (backend, _, sound) = fixture();
        sound.set_looping(true);
        assert!(sound.is_looping());
        assert!(backend.calls().is_empty());
        assert_eq!(sound.state(), PlaybackState::Stopped);
    }

    #[test]
    fn completion_without_looping_stays_at_end() {
        let (backend, _, sound) = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        sound.on_complete(move |looping| {
            seen_in.lock().unwrap().push(looping);
            Ok(())
        });

        sound.play().unwrap();
        backend.clear_calls();
        assert!(backend.finish_iteration());

        assert_eq!(*seen.lock().unwrap(), vec![false]);
        assert_eq!(sound.state(), PlaybackState::EndOfIteration);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn completion_with_looping_restarts() {
        let (backend, _, sound) = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        sound.on_complete(move |looping| {
            seen_in.lock().unwrap().push(looping);
            Ok(())
        });
        sound.set_looping(true);
        sound.play().unwrap();
        backend.clear_calls();

        backend.finish_iteration();
        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert!(sound.is_playing());
        assert_eq!(backend.calls(), vec![BackendCall::Stop, BackendCall::Start]);
    }

    #[test]
    fn handler_stop_cancels_restart() {
        let (backend, _, sound) = fixture();
        let weak = sound.downgrade();
        sound.on_complete(move |_| {
            if let Some(sound) = weak.upgrade() {
                sound.stop()?;
            }
            Ok(())
        });
        sound.set_looping(true);
        sound.play().unwrap();
        backend.clear_calls();

        backend.finish_iteration();
        assert_eq!(sound.state(), PlaybackState::Stopped);
        assert_eq!(backend.calls(), vec![BackendCall::Stop]);
    }

    #[test]
    fn handler_can_turn_looping_off() {
        let (backend, _, sound) = fixture();
        let weak = sound.downgrade();
        sound.on_complete(move |_| {
            if let Some(sound) = weak.upgrade() {
                sound.set_looping(false);
            }
            Ok(())
        });
        sound.set_looping(true);
        sound.play().unwrap();
        backend.finish_iteration();
        assert_eq!(sound.state(), PlaybackState::EndOfIteration);
    }

    #[test]
    fn failing_handler_is_reported_and_loop_continues() {
        let (backend, sink, sound) = fixture();
        sound.on_complete(|_| Err("boom".into()));
        sound.set_looping(true);
        sound.play().unwrap();

        backend.finish_iteration();
        assert!(sound.is_playing());
        assert_eq!(
            sink.entries(),
            vec![(
                "Media.Sound".to_string(),
                "Error during sound onComplete callback: boom".to_string()
            )]
        );
    }

    #[test]
    fn panicking_handler_is_contained() {
        let (backend, sink, sound) = fixture();
        sound.on_complete(|_| panic!("handler exploded"));
        sound.play().unwrap();

        backend.finish_iteration();
        assert_eq!(sound.state(), PlaybackState::EndOfIteration);
        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.contains("handler exploded"));

        // Lock is usable afterwards
        sound.play().unwrap();
        assert!(sound.is_playing());
    }

    #[test]
    fn replacing_handler_discards_previous() {
        let (backend, _, sound) = fixture();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = first.clone();
        sound.on_complete(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let s = second.clone();
        sound.on_complete(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        sound.play().unwrap();
        backend.finish_iteration();

        sound.set_on_complete(None);
        sound.play().unwrap();
        backend.finish_iteration();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_failure_is_logged_not_raised() {
        let (backend, sink, sound) = fixture();
        sound.set_looping(true);
        sound.play().unwrap();
        backend.fail_next(BackendCall::Start);

        backend.finish_iteration();
        assert_eq!(sound.state(), PlaybackState::Stopped);
        // The sink only hears about handler failures
        assert!(sink.is_empty());

        sound.play().unwrap();
        assert!(sound.is_playing());
    }

    #[test]
    fn handler_replaced_mid_dispatch_takes_effect_next_iteration() {
        let (backend, sink, sound) = fixture();
        let log = Arc::new(Mutex::new(Vec::new()));
        let weak = sound.downgrade();
        let first_log = log.clone();
        sound.on_complete(move |_| {
            first_log.lock().unwrap().push("first");
            if let Some(sound) = weak.upgrade() {
                let second_log = first_log.clone();
                sound.on_complete(move |_| {
                    second_log.lock().unwrap().push("second");
                    Ok(())
                });
            }
            Ok(())
        });
        sound.set_looping(true);
        sound.play().unwrap();

        backend.finish_iteration();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert!(sound.is_playing());

        backend.finish_iteration();
        backend.finish_iteration();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "second"]);
        assert!(sound.is_playing());
        assert!(sink.is_empty());
    }

    #[test]
    fn failed_load_propagates_and_keeps_state() {
        let (backend, _, sound) = fixture();
        backend.fail_next(BackendCall::Load);
        let err = sound.play().unwrap_err();
        assert!(matches!(err, SoundError::Backend(BackendError::Open { .. })));
        assert_eq!(sound.state(), PlaybackState::Stopped);
        assert!(!sound.is_loaded());

        // Caller retries
        sound.play().unwrap();
        assert!(sound.is_playing());
    }

    #[test]
    fn failed_pause_keeps_state() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        backend.fail_next(BackendCall::Pause);
        assert!(matches!(sound.pause(), Err(SoundError::Backend(_))));
        assert!(sound.is_playing());
    }

    #[test]
    fn reload_unloads_and_loads() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        backend.clear_calls();

        sound.reload().unwrap();
        assert_eq!(
            backend.calls(),
            vec![BackendCall::Stop, BackendCall::Unload, BackendCall::Load]
        );
        assert_eq!(sound.state(), PlaybackState::Stopped);
        assert!(sound.is_loaded());
    }

    #[test]
    fn reload_when_never_loaded_just_loads() {
        let (backend, _, sound) = fixture();
        sound.reload().unwrap();
        assert_eq!(backend.calls(), vec![BackendCall::Load]);
    }

    #[test]
    fn apply_dispatches_commands() {
        let (_, _, sound) = fixture();
        sound.apply(SoundCommand::SetVolume { volume: 4.0 }).unwrap();
        sound.apply(SoundCommand::SetLooping { looping: true }).unwrap();
        sound.apply(SoundCommand::Play).unwrap();
        assert!(sound.is_playing());
        sound.apply(SoundCommand::Pause).unwrap();
        assert!(sound.is_paused());
        sound.apply(SoundCommand::Stop).unwrap();
        assert!(matches!(
            sound.apply(SoundCommand::Pause),
            Err(SoundError::NotPlaying)
        ));

        let status = sound.status();
        assert_eq!(status.volume, 1.0);
        assert!(status.looping);
        assert_eq!(status.state, PlaybackState::Stopped);
    }

    #[test]
    fn stale_notification_is_dropped() {
        let (_, _, sound) = fixture();
        sound.play().unwrap();
        sound.notifier().iteration_complete_if(|| false);
        assert!(sound.is_playing());
    }

    #[test]
    fn drop_releases_backend_resource() {
        let (backend, _, sound) = fixture();
        sound.play().unwrap();
        let notifier = sound.notifier();
        backend.clear_calls();

        drop(sound);
        assert_eq!(backend.calls(), vec![BackendCall::Stop, BackendCall::Unload]);
        assert!(!notifier.is_attached());
        // Delivering to a dropped sound is harmless
        notifier.iteration_complete();
    }

    #[test]
    fn from_config_applies_initial_settings() {
        let backend = Arc::new(RecordingBackend::new());
        let config = SoundConfig {
            volume: 0.5,
            looping: true,
            resource_root: PathBuf::from("/res"),
            diagnostic_category: "Test.Sound".into(),
        };
        let sound = Sound::from_config("app://demo/a.wav", backend, &config).unwrap();
        assert_eq!(sound.volume(), 0.5);
        assert!(sound.is_looping());
        assert_eq!(sound.path(), PathBuf::from("/res/a.wav"));
    }

    #[test]
    fn unresolvable_locator_fails_construction() {
        let err = Sound::new("https://example.com/a.mp3", Arc::new(RecordingBackend::new()))
            .unwrap_err();
        assert!(matches!(err, SoundError::Resolve(_)));
    }
}
