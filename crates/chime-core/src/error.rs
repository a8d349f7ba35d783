//! Error types.
//!
//! Caller-facing failures only. Completion-handler failures never reach
//! these types; they stop at the notification boundary (see `sound`).

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`Sound`](crate::Sound) operations.
#[derive(Debug, Error)]
pub enum SoundError {
    /// `pause()` while the sound is stopped or already paused.
    #[error("sound is not currently playing")]
    NotPlaying,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Failures reported by a [`SoundBackend`](crate::backend::SoundBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no resource loaded")]
    NotLoaded,

    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Failures turning a locator into a local resource path.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("empty locator")]
    Empty,

    #[error("unsupported locator scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("locator `{0}` does not name a local file")]
    NotAFilePath(String),
}

/// Failures loading a [`SoundConfig`](crate::SoundConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, SoundError>;

pub type BackendResult<T> = std::result::Result<T, BackendError>;
