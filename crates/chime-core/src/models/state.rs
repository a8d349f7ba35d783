//! Playback state and commands.
//!
//! PlaybackState is owned by the controller; callers only observe it.
//! SoundCommand is a tagged enum so a shell or host can dispatch onto a
//! sound without knowing its method names.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a sound is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// The backend reported the natural end of one play-through.
    EndOfIteration,
}

impl PlaybackState {
    /// True in the states `pause()` accepts.
    pub fn is_in_motion(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::EndOfIteration)
    }
}

/// Point-in-time view of a sound, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundStatus {
    pub locator: String,
    pub path: PathBuf,
    pub state: PlaybackState,
    pub looping: bool,
    pub volume: f64,
    pub loaded: bool,
}

/// A control operation expressed as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SoundCommand {
    Play,
    Pause,
    Stop,
    Reload,
    SetVolume { volume: f64 },
    SetLooping { looping: bool },
}

impl SoundCommand {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }

    /// Parse a shell line such as `volume 0.5` or `loop on`.
    ///
    /// Lines starting with `{` are read as JSON commands.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.starts_with('{') {
            return serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| Self::from_value(&v));
        }

        let mut words = line.split_whitespace();
        let cmd = match words.next()? {
            "play" => SoundCommand::Play,
            "pause" => SoundCommand::Pause,
            "stop" => SoundCommand::Stop,
            "reload" => SoundCommand::Reload,
            "volume" => SoundCommand::SetVolume {
                volume: words.next()?.parse().ok()?,
            },
            "loop" => SoundCommand::SetLooping {
                looping: match words.next()? {
                    "on" | "true" => true,
                    "off" | "false" => false,
                    _ => return None,
                },
            },
            _ => return None,
        };
        if words.next().is_some() {
            return None;
        }
        Some(cmd)
    }
}
