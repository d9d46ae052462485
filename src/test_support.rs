use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

use crate::audio_output::{AudioElement, AudioEnded, AudioOutput, SynthesizedAudio};
use crate::error::{PlaybackError, SynthesisFailure};
use crate::events::{EventSink, PlaybackEvent, PlaybackState};
use crate::local_engine::{SpeechEngine, Utterance, UtteranceDone, Voice};

pub(crate) fn voice(name: &str, lang: &str) -> Voice {
    Voice {
        id: name.to_ascii_lowercase(),
        name: name.to_string(),
        lang: lang.to_string(),
        is_default: false,
        local_service: true,
    }
}

pub(crate) async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Complete,
    Fail(SynthesisFailure),
    Hold,
}

#[derive(Default)]
struct EngineInner {
    voices: Mutex<Vec<Voice>>,
    changed: Notify,
    spoken: Mutex<Vec<Utterance>>,
    script: Mutex<VecDeque<Scripted>>,
    pending: Mutex<Vec<oneshot::Sender<Result<(), SynthesisFailure>>>>,
    hold: AtomicBool,
    paused: AtomicBool,
    cancels: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeSpeechEngine {
    inner: Arc<EngineInner>,
}

impl FakeSpeechEngine {
    pub(crate) fn with_voices(voices: Vec<Voice>) -> Self {
        let engine = Self::default();
        engine.set_voices(voices);
        engine
    }

    pub(crate) fn set_voices(&self, voices: Vec<Voice>) {
        *self.inner.voices.lock().unwrap() = voices;
        self.inner.changed.notify_one();
    }

    /// Utterances without a scripted outcome stay pending until released.
    pub(crate) fn hold_utterances(&self) {
        self.inner.hold.store(true, Ordering::SeqCst);
    }

    pub(crate) fn script(&self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.inner.script.lock().unwrap().extend(outcomes);
    }

    pub(crate) fn complete_pending(&self) {
        for tx in self.inner.pending.lock().unwrap().drain(..) {
            let _ = tx.send(Ok(()));
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    pub(crate) fn spoken_texts(&self) -> Vec<String> {
        self.inner.spoken.lock().unwrap().iter().map(|u| u.text.clone()).collect()
    }

    pub(crate) fn spoken_voices(&self) -> Vec<Option<String>> {
        self.inner
            .spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.voice.as_ref().map(|v| v.name.clone()))
            .collect()
    }

    pub(crate) fn spoken(&self) -> Vec<Utterance> {
        self.inner.spoken.lock().unwrap().clone()
    }

    pub(crate) fn cancel_count(&self) -> usize {
        self.inner.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeechEngine {
    fn voices(&self) -> Vec<Voice> {
        self.inner.voices.lock().unwrap().clone()
    }

    async fn voices_changed(&self) {
        self.inner.changed.notified().await;
    }

    fn speak(&self, utterance: Utterance) -> Result<UtteranceDone, SynthesisFailure> {
        self.inner.spoken.lock().unwrap().push(utterance);
        let scripted = self.inner.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            if self.inner.hold.load(Ordering::SeqCst) {
                Scripted::Hold
            } else {
                Scripted::Complete
            }
        });

        let (tx, rx) = oneshot::channel();
        match scripted {
            Scripted::Complete => {
                let _ = tx.send(Ok(()));
            }
            Scripted::Fail(failure) => {
                let _ = tx.send(Err(failure));
            }
            Scripted::Hold => self.inner.pending.lock().unwrap().push(tx),
        }
        Ok(rx)
    }

    fn cancel(&self) {
        self.inner.cancels.fetch_add(1, Ordering::SeqCst);
        for tx in self.inner.pending.lock().unwrap().drain(..) {
            let _ = tx.send(Err(SynthesisFailure::Interrupted));
        }
    }

    fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct OutputInner {
    loaded: Mutex<Vec<(Vec<u8>, f32)>>,
    actions: Mutex<Vec<&'static str>>,
    pending: Mutex<Vec<oneshot::Sender<Result<(), PlaybackError>>>>,
    hold: AtomicBool,
    fail_resume: AtomicBool,
}

/// Audio output whose elements "play" instantly unless told to hold.
#[derive(Clone, Default)]
pub(crate) struct FakeAudioOutput {
    inner: Arc<OutputInner>,
}

impl FakeAudioOutput {
    pub(crate) fn hold_playback(&self) {
        self.inner.hold.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_resume(&self) {
        self.inner.fail_resume.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish_playing(&self) {
        for tx in self.inner.pending.lock().unwrap().drain(..) {
            let _ = tx.send(Ok(()));
        }
    }

    pub(crate) fn loaded(&self) -> Vec<(Vec<u8>, f32)> {
        self.inner.loaded.lock().unwrap().clone()
    }

    pub(crate) fn actions(&self) -> Vec<&'static str> {
        self.inner.actions.lock().unwrap().clone()
    }

    fn record(&self, action: &'static str) {
        self.inner.actions.lock().unwrap().push(action);
    }
}

#[async_trait]
impl AudioOutput for FakeAudioOutput {
    async fn load(&self, audio: SynthesizedAudio, playback_rate: f32) -> Result<Box<dyn AudioElement>, PlaybackError> {
        self.inner.loaded.lock().unwrap().push((audio.bytes, playback_rate));
        let (tx, rx) = oneshot::channel();
        Ok(Box::new(FakeElement {
            output: self.clone(),
            ended_tx: Some(tx),
            ended_rx: Some(rx),
            started: false,
            paused: false,
            released: false,
        }))
    }
}

struct FakeElement {
    output: FakeAudioOutput,
    ended_tx: Option<oneshot::Sender<Result<(), PlaybackError>>>,
    ended_rx: Option<AudioEnded>,
    started: bool,
    paused: bool,
    released: bool,
}

#[async_trait]
impl AudioElement for FakeElement {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        if self.released {
            return Err(PlaybackError::Audio("released".to_string()));
        }
        if !self.started {
            self.started = true;
            self.output.record("play");
            if let Some(tx) = self.ended_tx.take() {
                if self.output.inner.hold.load(Ordering::SeqCst) {
                    self.output.inner.pending.lock().unwrap().push(tx);
                } else {
                    let _ = tx.send(Ok(()));
                }
            }
            return Ok(());
        }
        if self.paused {
            if self.output.inner.fail_resume.load(Ordering::SeqCst) {
                return Err(PlaybackError::Audio("play() request was blocked".to_string()));
            }
            self.paused = false;
            self.output.record("resume");
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.paused = true;
        self.output.record("pause");
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn ended(&mut self) -> Option<AudioEnded> {
        self.ended_rx.take()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.output.record("release");
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn states(&self) -> Vec<PlaybackState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlaybackEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlaybackEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PlaybackEvent) {
        self.events.lock().unwrap().push(event);
    }
}
