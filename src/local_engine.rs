use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep, Instant};

use crate::error::SynthesisFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub lang: String,
    pub is_default: bool,
    pub local_service: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
}

/// Resolves exactly once, when the utterance finishes or fails.
pub type UtteranceDone = oneshot::Receiver<Result<(), SynthesisFailure>>;

/// Pause, resume and cancel act on the engine as a whole, not on a single
/// utterance.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Voices known right now; may be empty until the engine has loaded them.
    fn voices(&self) -> Vec<Voice>;

    /// Resolves when the voice list may have changed. Engines without such a
    /// notification are polled instead.
    async fn voices_changed(&self) {
        std::future::pending::<()>().await
    }

    fn speak(&self, utterance: Utterance) -> Result<UtteranceDone, SynthesisFailure>;
    fn cancel(&self);
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
}

const MIN_VOICE_POLL: Duration = Duration::from_millis(1);

/// Waits until the engine reports voices, polling every `poll` and giving up
/// after `timeout` with whatever list is available then.
pub async fn wait_for_voices(engine: &dyn SpeechEngine, poll: Duration, timeout: Duration) -> Vec<Voice> {
    let initial = engine.voices();
    if !initial.is_empty() {
        return initial;
    }

    let poll = poll.max(MIN_VOICE_POLL);
    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = interval_at(Instant::now() + poll, poll);

    loop {
        tokio::select! {
            _ = &mut deadline => return engine.voices(),
            _ = engine.voices_changed() => {}
            _ = ticker.tick() => {}
        }
        let voices = engine.voices();
        if !voices.is_empty() {
            return voices;
        }
    }
}

/// Picks the voice used when the configured one is missing: exact locale,
/// then language prefix, then the engine default, then a local voice, then
/// the first one listed.
pub fn pick_fallback_voice<'a>(voices: &'a [Voice], locale: &str) -> Option<&'a Voice> {
    let locale = normalize_lang(locale);
    let language = locale.split('-').next().unwrap_or_default();

    let by_locale = (!locale.is_empty())
        .then(|| voices.iter().find(|voice| normalize_lang(&voice.lang) == locale))
        .flatten();
    let by_language = (!language.is_empty())
        .then(|| voices.iter().find(|voice| normalize_lang(&voice.lang).starts_with(language)))
        .flatten();

    by_locale
        .or(by_language)
        .or_else(|| voices.iter().find(|voice| voice.is_default))
        .or_else(|| voices.iter().find(|voice| voice.local_service))
        .or_else(|| voices.first())
}

fn normalize_lang(lang: &str) -> String {
    lang.trim().replace('_', "-").to_ascii_lowercase()
}

/// Voices for one local playback: the configured one (exact name match) and
/// the locale-based fallback.
#[derive(Debug, Clone, Default)]
pub struct VoiceSelection {
    pub selected: Option<Voice>,
    pub fallback: Option<Voice>,
}

impl VoiceSelection {
    pub fn resolve(voices: &[Voice], configured_name: &str, locale: &str) -> Self {
        let configured_name = configured_name.trim();
        let selected = (!configured_name.is_empty())
            .then(|| voices.iter().find(|voice| voice.name == configured_name))
            .flatten()
            .cloned();
        Self {
            selected,
            fallback: pick_fallback_voice(voices, locale).cloned(),
        }
    }

    pub fn preferred(&self) -> Option<&Voice> {
        self.selected.as_ref().or(self.fallback.as_ref())
    }

    /// The fallback, unless it is the voice that was already tried.
    pub fn retry_voice(&self) -> Option<&Voice> {
        let fallback = self.fallback.as_ref()?;
        match self.preferred() {
            Some(voice) if voice.name == fallback.name => None,
            _ => Some(fallback),
        }
    }
}
