use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::audio_output::AudioOutput;
use crate::error::PlaybackError;
use crate::events::{EventSink, PlaybackState};
use crate::local_engine::SpeechEngine;
use crate::providers::Providers;
use crate::session::{PlaybackContext, SessionManager};
use crate::settings::{PlaybackOptions, Settings};

/// How a `speak` request ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Every chunk was heard and the UI is idle again.
    Finished,
    /// A newer request or a stop took over; nothing was reported.
    Superseded,
    /// The text was blank; the current playback was left alone.
    NothingToSay,
}

struct Inner {
    manager: SessionManager,
    providers: Providers,
    settings: watch::Sender<Settings>,
}

#[derive(Clone)]
pub struct ReadAloud {
    inner: Arc<Inner>,
}

impl ReadAloud {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        output: Arc<dyn AudioOutput>,
        events: Arc<dyn EventSink>,
        settings: Settings,
        options: PlaybackOptions,
    ) -> Result<Self> {
        let providers = Providers::new(&options)?;
        let manager = SessionManager::new(engine, output, events, options.error_display);
        let (settings, _) = watch::channel(settings);
        Ok(Self {
            inner: Arc::new(Inner {
                manager,
                providers,
                settings,
            }),
        })
    }

    /// Reads `text` aloud with the configured provider, replacing whatever
    /// is playing. Resolves once playback is over; a request that was
    /// superseded resolves quietly.
    pub async fn speak(&self, text: &str) -> Result<SpeakOutcome, PlaybackError> {
        if text.trim().is_empty() {
            return Ok(SpeakOutcome::NothingToSay);
        }

        let manager = &self.inner.manager;
        let session = manager.start_session().await;
        let settings = self.settings();
        let provider = settings.resolve_provider();
        if provider != settings.provider {
            debug!(preferred = %settings.provider, "No API key for preferred provider; using local voice");
        }
        info!(session = session.id(), %provider, chars = text.chars().count(), "Read-aloud started");

        let result = self
            .inner
            .providers
            .play(provider, text, &settings, PlaybackContext::new(manager, &session))
            .await;

        match result {
            Ok(()) if manager.is_current(&session) => {
                manager.set_state(PlaybackState::Idle);
                info!(session = session.id(), "Read-aloud finished");
                Ok(SpeakOutcome::Finished)
            }
            Ok(()) => Ok(SpeakOutcome::Superseded),
            Err(err) if err.is_cancellation() || !manager.is_current(&session) => {
                debug!(session = session.id(), "Read-aloud superseded: {err}");
                Ok(SpeakOutcome::Superseded)
            }
            Err(err) => {
                warn!(session = session.id(), %provider, "Read-aloud failed: {err}");
                manager.stop_with_error(err.user_message()).await;
                Err(err)
            }
        }
    }

    pub async fn stop(&self) {
        self.inner.manager.stop().await;
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.inner.manager.pause().await
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        self.inner.manager.resume().await
    }

    /// Single pause/resume control: pauses while playing, resumes while
    /// paused, otherwise does nothing.
    pub async fn toggle_pause(&self) -> Result<(), PlaybackError> {
        match self.state() {
            PlaybackState::Playing => self.pause().await,
            PlaybackState::Paused => self.resume().await,
            PlaybackState::Idle | PlaybackState::Processing => Ok(()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.manager.state()
    }

    /// Snapshot used by the next `speak`; requests already running keep
    /// the settings they started with.
    pub fn settings(&self) -> Settings {
        self.inner.settings.borrow().clone()
    }

    pub fn update_settings(&self, settings: Settings) {
        self.inner.settings.send_replace(settings);
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.inner.settings.subscribe()
    }
}
