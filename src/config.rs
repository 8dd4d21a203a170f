use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub playback: PlaybackConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pace events by their TTS audio when they carry any.
    pub audio: bool,
    /// Fixed delay used for events paced by the timer.
    pub pace: Pace,
    /// Output device name; `None` uses the system default.
    pub device: Option<String>,
}

/// Timer pacing preset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    #[default]
    Fast,
    Slow,
}

impl Pace {
    pub fn interval(self) -> Duration {
        match self {
            Pace::Fast => Duration::from_millis(defaults::FAST_PACE_MS),
            Pace::Slow => Duration::from_millis(defaults::SLOW_PACE_MS),
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Pace::Fast => Pace::Slow,
            Pace::Slow => Pace::Fast,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pace::Fast => "fast",
            Pace::Slow => "slow",
        }
    }
}

impl std::str::FromStr for Pace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "1000" | "1s" => Ok(Pace::Fast),
            "slow" | "3000" | "3s" => Ok(Pace::Slow),
            other => Err(format!("unknown pace '{other}', expected 'fast' or 'slow'")),
        }
    }
}

impl std::fmt::Display for Pace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} ms)", self.as_str(), self.interval().as_millis())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: defaults::DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            audio: defaults::AUDIO_ENABLED,
            pace: Pace::default(),
            device: None,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PREVISIT_SERVER_URL → server.url
    /// - PREVISIT_AUDIO → playback.audio (true/false, on/off, 1/0)
    /// - PREVISIT_PACE → playback.pace (fast/slow)
    /// - PREVISIT_AUDIO_DEVICE → playback.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PREVISIT_SERVER_URL")
            && !url.is_empty()
        {
            self.server.url = url;
        }

        if let Ok(audio) = std::env::var("PREVISIT_AUDIO")
            && !audio.is_empty()
        {
            match parse_flag(&audio) {
                Some(enabled) => self.playback.audio = enabled,
                None => tracing::warn!("ignoring PREVISIT_AUDIO={audio}: not a boolean"),
            }
        }

        if let Ok(pace) = std::env::var("PREVISIT_PACE")
            && !pace.is_empty()
        {
            match pace.parse::<Pace>() {
                Ok(pace) => self.playback.pace = pace,
                Err(e) => tracing::warn!("ignoring PREVISIT_PACE: {e}"),
            }
        }

        if let Ok(device) = std::env::var("PREVISIT_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.playback.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/previsit/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("previsit")
            .join("config.toml")
    }

    /// Serialize the effective configuration back to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Commented template with every default spelled out.
    pub fn dump_template() -> String {
        format!(
            "# previsit configuration\n\
             \n\
             [server]\n\
             # Backend serving /api/stream_conversation and /api/evaluate_report\n\
             url = \"{url}\"\n\
             \n\
             [playback]\n\
             # Pace events by their TTS audio when present\n\
             audio = {audio}\n\
             # Timer pacing: \"fast\" ({fast} ms) or \"slow\" ({slow} ms)\n\
             pace = \"fast\"\n\
             # Output device (see `previsit devices`); omit for the system default\n\
             # device = \"pulse\"\n",
            url = defaults::DEFAULT_SERVER_URL,
            audio = defaults::AUDIO_ENABLED,
            fast = defaults::FAST_PACE_MS,
            slow = defaults::SLOW_PACE_MS,
        )
    }
}
