//! chime data models.
//!
//! Small value types only: the playback state and the tagged command
//! enum used to drive a sound from text or JSON.

pub mod state;

pub use state::{PlaybackState, SoundCommand, SoundStatus};
