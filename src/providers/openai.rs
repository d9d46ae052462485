use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{read_audio, until_cancelled};
use crate::audio_output::SynthesizedAudio;
use crate::error::PlaybackError;
use crate::session::PlaybackContext;
use crate::settings::Settings;

const PROVIDER: &str = "OpenAI";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
}

pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/audio/speech", base_url.trim_end_matches('/')),
        }
    }

    pub async fn play(&self, text: &str, settings: &Settings, ctx: PlaybackContext<'_>) -> Result<(), PlaybackError> {
        let audio = until_cancelled(ctx.token(), self.synthesize(text, settings)).await?;
        ctx.ensure_current()?;
        ctx.play_audio(audio, settings.playback_rate()).await
    }

    pub async fn synthesize(&self, text: &str, settings: &Settings) -> Result<SynthesizedAudio, PlaybackError> {
        let api_key = settings.openai_api_key.trim();
        if api_key.is_empty() {
            return Err(PlaybackError::Configuration("Set OpenAI API key in settings".to_string()));
        }

        let body = SpeechRequest {
            model: settings.openai_model(),
            voice: settings.openai_voice(),
            input: text,
            speed: settings.speed(),
        };
        debug!(model = body.model, voice = body.voice, chars = text.chars().count(), "OpenAI speech request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PlaybackError::transport(PROVIDER, err))?;
        read_audio(PROVIDER, response).await
    }
}
