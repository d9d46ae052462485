use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::audio_output::{AudioElement, AudioOutput, SynthesizedAudio};
use crate::error::{PlaybackError, SynthesisFailure};
use crate::events::{EventSink, PlaybackEvent, PlaybackState};
use crate::local_engine::{SpeechEngine, Utterance};

const RESUME_FAILED_MESSAGE: &str = "Could not resume";

#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    token: CancellationToken,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct SessionSlot {
    current: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
enum ActiveHandle {
    #[default]
    None,
    Utterance {
        session: u64,
    },
    Audio {
        session: u64,
        element: Box<dyn AudioElement>,
    },
}

impl ActiveHandle {
    fn session(&self) -> Option<u64> {
        match self {
            Self::None => None,
            Self::Utterance { session } | Self::Audio { session, .. } => Some(*session),
        }
    }
}

struct UiSlot {
    state: PlaybackState,
    // Bumped on every state change; a pending error clear is dropped when it moved.
    epoch: u64,
    error_seq: u64,
}

/// Owns the current session id, its cancellation token, the single live
/// speech/audio handle and the UI state.
pub struct SessionManager {
    slot: Mutex<SessionSlot>,
    handle: AsyncMutex<ActiveHandle>,
    ui: Arc<Mutex<UiSlot>>,
    engine: Arc<dyn SpeechEngine>,
    output: Arc<dyn AudioOutput>,
    events: Arc<dyn EventSink>,
    error_display: Duration,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        output: Arc<dyn AudioOutput>,
        events: Arc<dyn EventSink>,
        error_display: Duration,
    ) -> Self {
        Self {
            slot: Mutex::new(SessionSlot {
                current: 0,
                cancel: CancellationToken::new(),
            }),
            handle: AsyncMutex::new(ActiveHandle::None),
            ui: Arc::new(Mutex::new(UiSlot {
                state: PlaybackState::Idle,
                epoch: 0,
                error_seq: 0,
            })),
            engine,
            output,
            events,
            error_display,
        }
    }

    pub fn engine(&self) -> &Arc<dyn SpeechEngine> {
        &self.engine
    }

    /// Invalidates the previous session and returns a fresh one. This is the
    /// only place the current id changes.
    pub fn begin_session(&self) -> Session {
        let mut slot = lock(&self.slot);
        slot.cancel.cancel();
        slot.current += 1;
        slot.cancel = CancellationToken::new();
        debug!(session = slot.current, "session started");
        Session {
            id: slot.current,
            token: slot.cancel.clone(),
        }
    }

    pub fn current_session_id(&self) -> u64 {
        lock(&self.slot).current
    }

    pub fn is_current(&self, session: &Session) -> bool {
        self.current_session_id() == session.id
    }

    pub fn ensure_current(&self, session: &Session) -> Result<(), PlaybackError> {
        if self.is_current(session) && !session.token.is_cancelled() {
            Ok(())
        } else {
            Err(PlaybackError::Cancelled)
        }
    }

    /// Begins a session for a new playback request: releases whatever the
    /// previous one left behind and shows `Processing`.
    pub async fn start_session(&self) -> Session {
        let session = self.begin_session();
        {
            let mut handle = self.handle.lock().await;
            self.release_stale(&mut handle, self.current_session_id());
        }
        self.set_state_if_current(&session, PlaybackState::Processing);
        session
    }

    /// Cancels the current session and releases every handle. Safe to call
    /// when nothing is playing. Returns the session the stop ran under.
    pub async fn stop(&self) -> Session {
        let session = self.begin_session();
        {
            let mut handle = self.handle.lock().await;
            self.release_stale(&mut handle, self.current_session_id());
        }
        self.set_state_if_current(&session, PlaybackState::Idle);
        session
    }

    /// Stops after a failed request and shows `message`, unless a newer
    /// request began while the stop waited for the handle.
    pub async fn stop_with_error(&self, message: impl Into<String>) {
        let stopped = self.stop().await;
        if self.is_current(&stopped) {
            self.show_error(message);
        } else {
            debug!(session = stopped.id(), "error dropped; a newer request is running");
        }
    }

    fn release_stale(&self, handle: &mut ActiveHandle, current: u64) {
        if handle.session() == Some(current) {
            return;
        }
        match std::mem::take(handle) {
            ActiveHandle::Audio { session, mut element } => {
                debug!(session, "releasing audio element");
                element.release();
            }
            ActiveHandle::Utterance { session } => {
                debug!(session, "cancelling local speech");
                self.silence_engine();
            }
            ActiveHandle::None => self.silence_engine(),
        }
    }

    fn silence_engine(&self) {
        if self.engine.is_paused() {
            self.engine.resume();
        }
        self.engine.cancel();
    }

    async fn clear_handle(&self, session: u64) {
        let mut handle = self.handle.lock().await;
        if handle.session() != Some(session) {
            return;
        }
        if let ActiveHandle::Audio { mut element, .. } = std::mem::take(&mut *handle) {
            element.release();
        }
    }

    /// Loads and plays one piece of remote audio, resolving when it ends.
    /// The element is installed as the active handle only while `session`
    /// is current.
    pub async fn play_audio(
        &self,
        session: &Session,
        audio: SynthesizedAudio,
        playback_rate: f32,
    ) -> Result<(), PlaybackError> {
        let ended = {
            let mut handle = self.handle.lock().await;
            self.ensure_current(session)?;
            if handle.session().is_some() {
                self.release_stale(&mut handle, session.id);
            }

            let mut element = self.output.load(audio, playback_rate).await?;
            if self.ensure_current(session).is_err() {
                element.release();
                return Err(PlaybackError::Cancelled);
            }
            let Some(ended) = element.ended() else {
                element.release();
                return Err(PlaybackError::Audio("audio element has no completion signal".to_string()));
            };
            if let Err(err) = element.play().await {
                element.release();
                return Err(err);
            }
            *handle = ActiveHandle::Audio {
                session: session.id,
                element,
            };
            ended
        };
        self.enter_playing(session);

        let outcome = tokio::select! {
            biased;
            _ = session.token.cancelled() => Err(PlaybackError::Cancelled),
            ended = ended => ended.unwrap_or(Err(PlaybackError::Cancelled)),
        };
        self.clear_handle(session.id).await;
        outcome?;
        self.ensure_current(session)
    }

    pub async fn speak_utterance(&self, session: &Session, utterance: Utterance) -> Result<(), PlaybackError> {
        let done = {
            let mut handle = self.handle.lock().await;
            self.ensure_current(session)?;
            if handle.session().is_some() {
                self.release_stale(&mut handle, session.id);
            }
            let done = self.engine.speak(utterance)?;
            *handle = ActiveHandle::Utterance { session: session.id };
            done
        };
        self.enter_playing(session);

        let outcome = tokio::select! {
            biased;
            _ = session.token.cancelled() => Err(PlaybackError::Cancelled),
            done = done => done
                .unwrap_or(Err(SynthesisFailure::Interrupted))
                .map_err(PlaybackError::from),
        };
        self.clear_handle(session.id).await;
        outcome?;
        self.ensure_current(session)
    }

    /// Pauses the live handle. Ignored unless playing.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        if self.state() != PlaybackState::Playing {
            return Ok(());
        }
        let mut handle = self.handle.lock().await;
        if handle.session() != Some(self.current_session_id()) {
            return Ok(());
        }
        match &mut *handle {
            ActiveHandle::Audio { element, .. } => element.pause()?,
            ActiveHandle::Utterance { .. } => self.engine.pause(),
            ActiveHandle::None => return Ok(()),
        }
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Resumes the live handle. Ignored unless paused; the state becomes
    /// `Playing` only once the resume actually succeeded.
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        if self.state() != PlaybackState::Paused {
            return Ok(());
        }
        let mut handle = self.handle.lock().await;
        let current = self.current_session_id();
        if handle.session().is_some_and(|session| session != current) {
            return Ok(());
        }
        let resumed = match &mut *handle {
            ActiveHandle::Audio { element, .. } => element.play().await,
            ActiveHandle::Utterance { .. } | ActiveHandle::None => {
                self.engine.resume();
                Ok(())
            }
        };
        drop(handle);

        match resumed {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                Ok(())
            }
            Err(err) => {
                warn!("Resume failed: {err}");
                self.show_error(RESUME_FAILED_MESSAGE);
                Err(err)
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.ui).state
    }

    pub fn set_state(&self, state: PlaybackState) {
        let mut ui = lock(&self.ui);
        if ui.state == state {
            return;
        }
        ui.state = state;
        ui.epoch += 1;
        self.events.emit(PlaybackEvent::StateChanged { state });
    }

    pub fn set_state_if_current(&self, session: &Session, state: PlaybackState) {
        if self.is_current(session) {
            self.set_state(state);
        }
    }

    pub fn mark_processing(&self, session: &Session) {
        self.set_state_if_current(session, PlaybackState::Processing);
    }

    // A paused engine keeps its state when the next utterance is queued.
    fn enter_playing(&self, session: &Session) {
        if !self.is_current(session) {
            return;
        }
        let mut ui = lock(&self.ui);
        if matches!(ui.state, PlaybackState::Playing | PlaybackState::Paused) {
            return;
        }
        ui.state = PlaybackState::Playing;
        ui.epoch += 1;
        self.events.emit(PlaybackEvent::StateChanged {
            state: PlaybackState::Playing,
        });
    }

    /// Shows `message`, then clears it after the display time unless the
    /// state changed or another error replaced it meanwhile.
    pub fn show_error(&self, message: impl Into<String>) {
        let message = message.into();
        let (seq, epoch) = {
            let mut ui = lock(&self.ui);
            ui.error_seq += 1;
            self.events.emit(PlaybackEvent::Error { message });
            (ui.error_seq, ui.epoch)
        };

        let ui = self.ui.clone();
        let events = self.events.clone();
        let delay = self.error_display;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let ui = lock(&ui);
            if ui.error_seq == seq && ui.epoch == epoch {
                events.emit(PlaybackEvent::ErrorCleared);
            }
        });
    }
}

#[derive(Clone, Copy)]
pub struct PlaybackContext<'a> {
    manager: &'a SessionManager,
    session: &'a Session,
}

impl<'a> PlaybackContext<'a> {
    pub fn new(manager: &'a SessionManager, session: &'a Session) -> Self {
        Self { manager, session }
    }

    pub fn token(&self) -> &'a CancellationToken {
        &self.session.token
    }

    pub fn ensure_current(&self) -> Result<(), PlaybackError> {
        self.manager.ensure_current(self.session)
    }

    pub fn mark_processing(&self) {
        self.manager.mark_processing(self.session);
    }

    pub async fn play_audio(&self, audio: SynthesizedAudio, playback_rate: f32) -> Result<(), PlaybackError> {
        self.manager.play_audio(self.session, audio, playback_rate).await
    }

    pub async fn speak_utterance(&self, utterance: Utterance) -> Result<(), PlaybackError> {
        self.manager.speak_utterance(self.session, utterance).await
    }

    pub fn engine(&self) -> &'a Arc<dyn SpeechEngine> {
        self.manager.engine()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
