//! In-memory backend that records every command.
//!
//! Stands in for a platform engine in tests and headless hosts. Natural
//! end of media is simulated with [`RecordingBackend::finish_iteration`].

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::SoundBackend;
use crate::error::{BackendError, BackendResult};
use crate::sound::IterationNotifier;

/// One primitive invoked on a [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    Load,
    Unload,
    Start,
    Pause,
    Stop,
    SetVolume,
}

#[derive(Debug)]
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    volume: Mutex<f64>,
    loaded: Mutex<Option<PathBuf>>,
    notifier: Mutex<Option<IterationNotifier>>,
    fail_next: Mutex<Option<BackendCall>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            volume: Mutex::new(1.0),
            loaded: Mutex::new(None),
            notifier: Mutex::new(None),
            fail_next: Mutex::new(None),
        }
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls (state such as the loaded path is kept).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, call: BackendCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Path of the currently held resource.
    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.loaded.lock().clone()
    }

    /// Make the next `call` fail once.
    pub fn fail_next(&self, call: BackendCall) {
        *self.fail_next.lock() = Some(call);
    }

    /// Report a natural end of media, as a real engine would.
    ///
    /// Returns false when nothing is loaded.
    pub fn finish_iteration(&self) -> bool {
        // Cloned out: the completion sequence calls back into this backend
        let notifier = self.notifier.lock().clone();
        match notifier {
            Some(notifier) => {
                notifier.iteration_complete();
                true
            }
            None => false,
        }
    }

    fn record(&self, call: BackendCall) -> BackendResult<()> {
        self.calls.lock().push(call);
        let mut fail = self.fail_next.lock();
        if *fail == Some(call) {
            *fail = None;
            return Err(match call {
                BackendCall::Load => BackendError::Open {
                    path: PathBuf::new(),
                    source: io::Error::new(io::ErrorKind::NotFound, "injected load failure"),
                },
                other => BackendError::Device(format!("injected {:?} failure", other)),
            });
        }
        Ok(())
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBackend for RecordingBackend {
    fn load(&self, path: &Path, notifier: IterationNotifier) -> BackendResult<()> {
        self.record(BackendCall::Load)?;
        *self.loaded.lock() = Some(path.to_path_buf());
        *self.notifier.lock() = Some(notifier);
        Ok(())
    }

    fn unload(&self) -> BackendResult<()> {
        self.record(BackendCall::Unload)?;
        *self.loaded.lock() = None;
        *self.notifier.lock() = None;
        Ok(())
    }

    fn start(&self) -> BackendResult<()> {
        if self.loaded.lock().is_none() {
            return Err(BackendError::NotLoaded);
        }
        self.record(BackendCall::Start)
    }

    fn pause(&self) -> BackendResult<()> {
        self.record(BackendCall::Pause)
    }

    fn stop(&self) -> BackendResult<()> {
        self.record(BackendCall::Stop)
    }

    fn set_volume(&self, volume: f64) {
        self.calls.lock().push(BackendCall::SetVolume);
        *self.volume.lock() = volume;
    }

    fn volume(&self) -> f64 {
        *self.volume.lock()
    }
}
