//! chime-core — playback control for a single sound.
//!
//! The controller owns the state; backends only do what they are told and
//! report when the media runs out.
//!
//! # Architecture
//!
//! ```text
//! caller ──play/pause/stop──▶ Sound ──start/pause/stop──▶ SoundBackend
//!                              ▲                               │
//!   handler(looping) ◀─────────┴──── IterationNotifier ◀───────┘
//! ```
//!
//! Collaborators are injected: a [`LocatorResolver`] turns the locator into
//! a path, a [`DiagnosticSink`] receives completion-handler failures.
//!
//! ```
//! use std::sync::Arc;
//! use chime_core::backend::recording::RecordingBackend;
//! use chime_core::{PlaybackState, Sound};
//!
//! let backend = Arc::new(RecordingBackend::new());
//! let sound = Sound::new("sounds/chime.wav", backend.clone()).unwrap();
//! sound.set_looping(true);
//! sound.on_complete(|looping| {
//!     assert!(looping);
//!     Ok(())
//! });
//! sound.play().unwrap();
//! backend.finish_iteration();
//! assert_eq!(sound.state(), PlaybackState::Playing);
//! ```

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod resolve;
pub mod sound;

pub use backend::{NoopBackend, SoundBackend};
pub use config::SoundConfig;
pub use diagnostics::{DiagnosticSink, LogSink};
pub use error::{BackendError, ConfigError, ResolveError, Result, SoundError};
pub use models::*;
pub use resolve::{LocatorResolver, UrlResolver};
pub use sound::{CompletionHandler, HandlerResult, IterationNotifier, Sound, WeakSound};
