use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::{RawAudioSequencer, DEFAULT_BUFFER_MS};
use crate::sequencer::{CONTENT_TYPE_UNKNOWN, USAGE_MEDIA};

/// Returns the path to the settings file: `~/.config/audio-sequencer/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("audio-sequencer");
    path.push("settings.json");
    path
}

/// Persisted playback settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Playback
    pub volume: f32,
    pub audio_usage: i32,
    pub content_type: i32,

    // Output device
    /// Substring of the output device name; default device when unset
    pub output_device: Option<String>,
    pub buffer_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            audio_usage: USAGE_MEDIA,
            content_type: CONTENT_TYPE_UNKNOWN,

            output_device: None,
            buffer_ms: DEFAULT_BUFFER_MS,
        }
    }
}

impl Settings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(settings_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        if let Err(e) = self.save_to(settings_path()) {
            log::warn!("Failed to write settings: {}", e);
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Extract current settings from a sequencer.
    pub fn from_sequencer(sequencer: &RawAudioSequencer, base: &Settings) -> Self {
        Self {
            volume: sequencer.strategy().volume(),
            audio_usage: sequencer.audio_usage(),
            content_type: sequencer.content_type(),
            ..base.clone()
        }
    }

    /// Apply loaded settings to a sequencer.
    pub fn apply(&self, sequencer: &RawAudioSequencer) {
        sequencer.set_audio_usage(self.audio_usage);
        sequencer.set_content_type(self.content_type);
        sequencer.strategy().set_volume(self.volume);
    }
}
