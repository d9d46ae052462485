use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_OPENAI_VOICE: &str = "alloy";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini-tts";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

const SETTINGS_DIR_NAME: &str = "readaloud";
const SETTINGS_FILE_NAME: &str = "settings.json";
const MIN_PLAYBACK_RATE: f32 = 0.5;
const MAX_PLAYBACK_RATE: f32 = 2.0;
const VOICES_POLL_MS: u64 = 120;
const VOICES_TIMEOUT_MS: u64 = 2400;
const ERROR_DISPLAY_MS: u64 = 2200;
const HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
}

impl ProviderKind {
    /// Unknown names (and the legacy `builtin`) select the local engine.
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Self::OpenAi,
            "elevenlabs" => Self::ElevenLabs,
            _ => Self::Local,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::ElevenLabs => "elevenlabs",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|value| Self::from_setting(&value)).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderKind,
    pub local_voice: String,
    pub locale: Option<String>,
    #[serde(deserialize_with = "lenient_multiplier")]
    pub speed: f32,
    #[serde(deserialize_with = "lenient_multiplier")]
    pub pitch: f32,
    pub openai_api_key: String,
    pub openai_voice: String,
    pub openai_model: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_model_id: String,
    pub elevenlabs_voice_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            local_voice: String::new(),
            locale: None,
            speed: 1.0,
            pitch: 1.0,
            openai_api_key: String::new(),
            openai_voice: DEFAULT_OPENAI_VOICE.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            elevenlabs_api_key: String::new(),
            elevenlabs_model_id: DEFAULT_ELEVENLABS_MODEL.to_string(),
            elevenlabs_voice_id: String::new(),
        }
    }
}

impl Settings {
    /// Reads `path`, or the default settings file when `path` is `None`.
    /// A missing default file yields defaults; empty API keys are filled from
    /// `OPENAI_API_KEY` and `ELEVENLABS_API_KEY`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::read_file(path)?,
            None => match default_settings_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.openai_api_key.trim().is_empty() {
            if let Some(key) = lookup("OPENAI_API_KEY") {
                self.openai_api_key = key.trim().to_string();
            }
        }
        if self.elevenlabs_api_key.trim().is_empty() {
            if let Some(key) = lookup("ELEVENLABS_API_KEY") {
                self.elevenlabs_api_key = key.trim().to_string();
            }
        }
    }

    pub fn speed(&self) -> f32 {
        sanitize_multiplier(self.speed)
    }

    pub fn pitch(&self) -> f32 {
        sanitize_multiplier(self.pitch)
    }

    pub fn playback_rate(&self) -> f32 {
        self.speed().clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    }

    pub fn has_provider_key(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Local => true,
            ProviderKind::OpenAi => !self.openai_api_key.trim().is_empty(),
            ProviderKind::ElevenLabs => !self.elevenlabs_api_key.trim().is_empty(),
        }
    }

    /// The provider a playback request will actually use: a remote provider
    /// without credentials quietly degrades to the local engine.
    pub fn resolve_provider(&self) -> ProviderKind {
        if self.has_provider_key(self.provider) {
            self.provider
        } else {
            ProviderKind::Local
        }
    }

    pub fn openai_model(&self) -> &str {
        non_empty_or(&self.openai_model, DEFAULT_OPENAI_MODEL)
    }

    pub fn openai_voice(&self) -> &str {
        non_empty_or(&self.openai_voice, DEFAULT_OPENAI_VOICE)
    }

    pub fn elevenlabs_model_id(&self) -> &str {
        non_empty_or(&self.elevenlabs_model_id, DEFAULT_ELEVENLABS_MODEL)
    }

    /// Lower-cased BCP-47 style tag used to pick a fallback local voice.
    pub fn effective_locale(&self) -> String {
        self.locale
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(normalize_locale)
            .or_else(system_locale)
            .unwrap_or_default()
    }
}

/// Runtime tuning for the playback core; not part of the user's settings.
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
    pub voices_poll_interval: Duration,
    pub voices_timeout: Duration,
    pub error_display: Duration,
    pub http_timeout: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            openai_base_url: OPENAI_BASE_URL.to_string(),
            elevenlabs_base_url: ELEVENLABS_BASE_URL.to_string(),
            voices_poll_interval: Duration::from_millis(VOICES_POLL_MS),
            voices_timeout: Duration::from_millis(VOICES_TIMEOUT_MS),
            error_display: Duration::from_millis(ERROR_DISPLAY_MS),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

impl PlaybackOptions {
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

fn lenient_multiplier<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(sanitize_multiplier(parsed.unwrap_or(1.0) as f32))
}

fn sanitize_multiplier(value: f32) -> f32 {
    if value.is_finite() && value != 0.0 {
        value
    } else {
        1.0
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

fn system_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
        .map(|value| normalize_locale(&value))
}

/// `en_US.UTF-8` and `en-US` both become `en-us`.
pub fn normalize_locale(raw: &str) -> String {
    let without_encoding = raw.split(['.', '@']).next().unwrap_or_default();
    without_encoding.trim().replace('_', "-").to_ascii_lowercase()
}
