use std::time::Duration;

use tracing::{debug, warn};

use crate::chunker::{split_text_into_chunks, LOCAL_MAX_CHUNK_CHARS};
use crate::error::PlaybackError;
use crate::local_engine::{wait_for_voices, Utterance, Voice, VoiceSelection};
use crate::session::PlaybackContext;
use crate::settings::Settings;

pub struct LocalVoiceProvider {
    poll: Duration,
    timeout: Duration,
}

impl LocalVoiceProvider {
    pub fn new(poll: Duration, timeout: Duration) -> Self {
        Self { poll, timeout }
    }

    pub async fn play(&self, text: &str, settings: &Settings, ctx: PlaybackContext<'_>) -> Result<(), PlaybackError> {
        let engine = ctx.engine();
        let voices = tokio::select! {
            biased;
            _ = ctx.token().cancelled() => return Err(PlaybackError::Cancelled),
            voices = wait_for_voices(engine.as_ref(), self.poll, self.timeout) => voices,
        };
        ctx.ensure_current()?;

        let selection = VoiceSelection::resolve(&voices, &settings.local_voice, &settings.effective_locale());
        if voices.is_empty() {
            debug!("No local voices reported; using the engine default");
        } else if selection.selected.is_none() && !settings.local_voice.trim().is_empty() {
            warn!(
                configured = %settings.local_voice,
                fallback = ?selection.fallback.as_ref().map(|voice| voice.name.as_str()),
                "Configured local voice not found"
            );
        }

        let chunks = split_text_into_chunks(text, LOCAL_MAX_CHUNK_CHARS, false);
        let first_attempt = speak_chunks(ctx, &chunks, selection.preferred(), settings).await;
        match first_attempt {
            Err(PlaybackError::Synthesis(failure)) if failure.is_transient() => {
                let Some(retry) = selection.retry_voice() else {
                    return Err(failure.into());
                };
                ctx.ensure_current()?;
                warn!(%failure, voice = %retry.name, "Local speech failed; retrying with fallback voice");
                speak_chunks(ctx, &chunks, Some(retry), settings).await
            }
            other => other,
        }
    }
}

async fn speak_chunks(
    ctx: PlaybackContext<'_>,
    chunks: &[String],
    voice: Option<&Voice>,
    settings: &Settings,
) -> Result<(), PlaybackError> {
    for chunk in chunks {
        ctx.ensure_current()?;
        ctx.speak_utterance(Utterance {
            text: chunk.clone(),
            voice: voice.cloned(),
            rate: settings.speed(),
            pitch: settings.pitch(),
        })
        .await?;
    }
    Ok(())
}
