use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{read_audio, until_cancelled};
use crate::audio_output::SynthesizedAudio;
use crate::chunker::{split_text_into_chunks, REMOTE_MAX_CHUNK_CHARS};
use crate::error::PlaybackError;
use crate::session::PlaybackContext;
use crate::settings::Settings;

const PROVIDER: &str = "ElevenLabs";
const API_KEY_HEADER: &str = "xi-api-key";
const DEFAULT_VOICE_NAME: &str = "Voice";

/// Models offered when the account's model list cannot be loaded.
pub const FALLBACK_MODELS: [(&str, &str); 3] = [
    ("eleven_multilingual_v2", "Eleven Multilingual v2"),
    ("eleven_flash_v2_5", "Eleven Flash v2.5"),
    ("eleven_turbo_v2_5", "Eleven Turbo v2.5"),
];

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

const VOICE_SETTINGS: VoiceSettings = VoiceSettings {
    stability: 0.5,
    similarity_boost: 0.75,
    style: 0.0,
    use_speaker_boost: true,
};

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: &'a VoiceSettings,
}

/// Chunked provider: paragraph-aware chunks, each synthesized and played
/// before the next request goes out.
pub struct ElevenLabsProvider {
    client: Client,
    base_url: String,
}

impl ElevenLabsProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn play(&self, text: &str, settings: &Settings, ctx: PlaybackContext<'_>) -> Result<(), PlaybackError> {
        voice_id(settings)?;
        let chunks = split_text_into_chunks(text, REMOTE_MAX_CHUNK_CHARS, true);
        debug!(chunks = chunks.len(), "ElevenLabs chunked playback");

        for chunk in &chunks {
            ctx.ensure_current()?;
            ctx.mark_processing();
            let audio = until_cancelled(ctx.token(), self.synthesize(chunk, settings)).await?;
            ctx.ensure_current()?;
            ctx.play_audio(audio, settings.playback_rate()).await?;
        }
        Ok(())
    }

    pub async fn synthesize(&self, text: &str, settings: &Settings) -> Result<SynthesizedAudio, PlaybackError> {
        let voice_id = voice_id(settings)?;
        let url = self.speech_url(voice_id)?;
        let body = SpeechRequest {
            text,
            model_id: settings.elevenlabs_model_id(),
            voice_settings: &VOICE_SETTINGS,
        };

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, settings.elevenlabs_api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|err| PlaybackError::transport(PROVIDER, err))?;
        read_audio(PROVIDER, response).await
    }

    fn speech_url(&self, voice_id: &str) -> Result<Url, PlaybackError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| PlaybackError::Configuration(format!("Invalid ElevenLabs URL {}: {err}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| PlaybackError::Configuration(format!("Invalid ElevenLabs URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v1", "text-to-speech", voice_id]);
        Ok(url)
    }
}

fn voice_id(settings: &Settings) -> Result<&str, PlaybackError> {
    let voice_id = settings.elevenlabs_voice_id.trim();
    if voice_id.is_empty() {
        Err(PlaybackError::Configuration("Set ElevenLabs Voice ID in settings".to_string()))
    } else {
        Ok(voice_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElevenLabsModel {
    pub model_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElevenLabsVoice {
    pub voice_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElevenLabsCatalog {
    pub models: Vec<ElevenLabsModel>,
    pub voices: Vec<ElevenLabsVoice>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Add an API key to load your ElevenLabs models and voices.")]
    MissingApiKey,
    #[error("Could not load ElevenLabs {what} ({status})")]
    Status { what: &'static str, status: u16 },
    #[error("Failed to load ElevenLabs catalog: {0}")]
    Request(#[from] reqwest::Error),
}

pub fn fallback_models() -> Vec<ElevenLabsModel> {
    FALLBACK_MODELS
        .iter()
        .map(|(model_id, name)| ElevenLabsModel {
            model_id: model_id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Loads the account's models and voices concurrently. Entries without an id
/// are skipped; unexpected payload shapes yield empty lists.
pub async fn fetch_catalog(client: &Client, base_url: &str, api_key: &str) -> Result<ElevenLabsCatalog, CatalogError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(CatalogError::MissingApiKey);
    }
    let base_url = base_url.trim_end_matches('/');
    let models_url = format!("{base_url}/v1/models");
    let voices_url = format!("{base_url}/v1/voices");

    let (models, voices) = futures_util::try_join!(
        fetch_json(client, &models_url, api_key, "models"),
        fetch_json(client, &voices_url, api_key, "voices"),
    )?;

    let models = models
        .as_array()
        .map(|entries| entries.iter().filter_map(parse_model).collect())
        .unwrap_or_default();
    let voices = voices
        .get("voices")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_voice).collect())
        .unwrap_or_default();
    Ok(ElevenLabsCatalog { models, voices })
}

async fn fetch_json(client: &Client, url: &str, api_key: &str, what: &'static str) -> Result<Value, CatalogError> {
    let response = client.get(url).header(API_KEY_HEADER, api_key).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Status {
            what,
            status: status.as_u16(),
        });
    }
    Ok(response.json::<Value>().await?)
}

fn parse_model(entry: &Value) -> Option<ElevenLabsModel> {
    let model_id = non_empty_str(entry, "model_id")?;
    Some(ElevenLabsModel {
        name: non_empty_str(entry, "name").unwrap_or(model_id).to_string(),
        model_id: model_id.to_string(),
    })
}

fn parse_voice(entry: &Value) -> Option<ElevenLabsVoice> {
    let voice_id = non_empty_str(entry, "voice_id")?;
    Some(ElevenLabsVoice {
        voice_id: voice_id.to_string(),
        name: non_empty_str(entry, "name").unwrap_or(DEFAULT_VOICE_NAME).to_string(),
    })
}

fn non_empty_str<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str).filter(|value| !value.is_empty())
}
