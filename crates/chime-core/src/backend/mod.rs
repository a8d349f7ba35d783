//! Backend contract.
//!
//! The controller drives a backend through these primitives and never
//! decodes or renders audio itself. All methods take `&self`; backends
//! manage their own interior state.
//!
//! A backend must report the natural end of each play-through through the
//! [`IterationNotifier`] it received in `load`, exactly once per
//! iteration, and never as a consequence of `stop`.

use std::path::Path;

use parking_lot::Mutex;

use crate::error::BackendResult;
use crate::sound::IterationNotifier;

#[cfg(feature = "native")]
pub mod native;
pub mod probe;
pub mod recording;

/// Platform media engine driven by a [`Sound`](crate::Sound).
pub trait SoundBackend: Send + Sync {
    /// Acquire the resource at `path`. `notifier` reports iteration ends.
    fn load(&self, path: &Path, notifier: IterationNotifier) -> BackendResult<()>;
    fn unload(&self) -> BackendResult<()>;
    /// Start from the beginning, or resume if paused.
    fn start(&self) -> BackendResult<()>;
    fn pause(&self) -> BackendResult<()>;
    fn stop(&self) -> BackendResult<()>;
    /// `volume` is already clamped to [0.0, 1.0].
    fn set_volume(&self, volume: f64);
    fn volume(&self) -> f64;
}

/// Headless backend: accepts every command and never completes an iteration.
///
/// Useful where only the state machine matters.
#[derive(Debug)]
pub struct NoopBackend {
    volume: Mutex<f64>,
}

impl NoopBackend {
    pub fn new() -> Self {
        Self {
            volume: Mutex::new(1.0),
        }
    }
}

impl Default for NoopBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBackend for NoopBackend {
    fn load(&self, _: &Path, _: IterationNotifier) -> BackendResult<()> { Ok(()) }
    fn unload(&self) -> BackendResult<()> { Ok(()) }
    fn start(&self) -> BackendResult<()> { Ok(()) }
    fn pause(&self) -> BackendResult<()> { Ok(()) }
    fn stop(&self) -> BackendResult<()> { Ok(()) }
    fn set_volume(&self, volume: f64) { *self.volume.lock() = volume; }
    fn volume(&self) -> f64 { *self.volume.lock() }
}
