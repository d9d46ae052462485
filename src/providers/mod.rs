pub mod elevenlabs;
pub mod local;
pub mod openai;

use std::future::Future;

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::audio_output::SynthesizedAudio;
use crate::error::PlaybackError;
use crate::session::PlaybackContext;
use crate::settings::{PlaybackOptions, ProviderKind, Settings};

pub use elevenlabs::{fetch_catalog, fallback_models, CatalogError, ElevenLabsCatalog, ElevenLabsModel, ElevenLabsProvider, ElevenLabsVoice};
pub use local::LocalVoiceProvider;
pub use openai::OpenAiProvider;

pub struct Providers {
    local: LocalVoiceProvider,
    openai: OpenAiProvider,
    elevenlabs: ElevenLabsProvider,
}

impl Providers {
    pub fn new(options: &PlaybackOptions) -> Result<Self> {
        let client = options.http_client()?;
        Ok(Self {
            local: LocalVoiceProvider::new(options.voices_poll_interval, options.voices_timeout),
            openai: OpenAiProvider::new(client.clone(), &options.openai_base_url),
            elevenlabs: ElevenLabsProvider::new(client, &options.elevenlabs_base_url),
        })
    }

    pub async fn play(
        &self,
        kind: ProviderKind,
        text: &str,
        settings: &Settings,
        ctx: PlaybackContext<'_>,
    ) -> Result<(), PlaybackError> {
        match kind {
            ProviderKind::Local => self.local.play(text, settings, ctx).await,
            ProviderKind::OpenAi => self.openai.play(text, settings, ctx).await,
            ProviderKind::ElevenLabs => self.elevenlabs.play(text, settings, ctx).await,
        }
    }
}

/// Runs `work` until it finishes or the session is cancelled, dropping the
/// in-flight request in the latter case.
pub(crate) async fn until_cancelled<T, F>(token: &CancellationToken, work: F) -> Result<T, PlaybackError>
where
    F: Future<Output = Result<T, PlaybackError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PlaybackError::Cancelled),
        result = work => result,
    }
}

/// Turns a synthesis response into playable audio; any non-2xx status is a
/// transport failure carrying the code.
pub(crate) async fn read_audio(provider: &'static str, response: Response) -> Result<SynthesizedAudio, PlaybackError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlaybackError::Transport {
            provider,
            status: Some(status.as_u16()),
            message: body,
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|err| PlaybackError::transport(provider, err))?;
    Ok(SynthesizedAudio::new(bytes.to_vec(), content_type))
}
