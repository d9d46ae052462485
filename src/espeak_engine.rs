use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use crate::error::SynthesisFailure;
use crate::local_engine::{SpeechEngine, Utterance, UtteranceDone, Voice};
use crate::process_control::{signal_process, ProcessSignal};

pub const DEFAULT_ESPEAK_PROGRAM: &str = "espeak-ng";
const BASE_WORDS_PER_MINUTE: f32 = 175.0;
const MIN_WORDS_PER_MINUTE: f32 = 80.0;
const MAX_WORDS_PER_MINUTE: f32 = 450.0;
const BASE_PITCH: f32 = 50.0;
const MAX_PITCH: f32 = 99.0;
const DEFAULT_LANGUAGE: &str = "en";

struct ActiveUtterance {
    pid: Option<u32>,
    // Dropping the sender makes the watcher kill the child.
    _kill: oneshot::Sender<()>,
}

/// Local engine backed by the `espeak-ng` command-line synthesizer.
///
/// The voice list is read in the background after construction, so callers
/// should wait for it with [`crate::local_engine::wait_for_voices`].
pub struct EspeakEngine {
    program: String,
    voices: Mutex<Vec<Voice>>,
    voices_ready: Notify,
    active: Mutex<Option<ActiveUtterance>>,
    paused: AtomicBool,
}

impl EspeakEngine {
    pub fn spawn(program: impl Into<String>) -> Arc<Self> {
        let engine = Arc::new(Self {
            program: program.into(),
            voices: Mutex::new(Vec::new()),
            voices_ready: Notify::new(),
            active: Mutex::new(None),
            paused: AtomicBool::new(false),
        });

        let loader = engine.clone();
        tokio::spawn(async move {
            match list_voices(&loader.program).await {
                Ok(voices) => {
                    debug!(count = voices.len(), "espeak voices loaded");
                    if let Ok(mut guard) = loader.voices.lock() {
                        *guard = voices;
                    }
                    loader.voices_ready.notify_one();
                }
                Err(err) => warn!("Failed to list espeak voices: {err:#}"),
            }
        });

        engine
    }

    fn signal_active(&self, signal: ProcessSignal) {
        let pid = match self.active.lock() {
            Ok(guard) => guard.as_ref().and_then(|active| active.pid),
            Err(_) => None,
        };
        if let Some(pid) = pid {
            if let Err(err) = signal_process(pid, signal) {
                debug!("espeak {signal:?} ignored: {err:#}");
            }
        }
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    async fn voices_changed(&self) {
        self.voices_ready.notified().await;
    }

    fn speak(&self, utterance: Utterance) -> Result<UtteranceDone, SynthesisFailure> {
        let mut command = Command::new(&self.program);
        command.args(speak_args(&utterance));
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!("Failed to start {}: {err}", self.program);
                SynthesisFailure::SynthesisFailed
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();

        if let Ok(mut guard) = self.active.lock() {
            *guard = Some(ActiveUtterance { pid, _kill: kill_tx });
        }
        // An utterance started during a pause begins suspended.
        if self.paused.load(Ordering::SeqCst) {
            self.signal_active(ProcessSignal::Stop);
        }

        let text = utterance.text;
        tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(err) = stdin.write_all(text.as_bytes()).await {
                    debug!("Failed writing utterance to espeak: {err}");
                }
            }
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let outcome = match finished {
                Some(Ok(status)) if status.success() => Ok(()),
                Some(Ok(status)) => {
                    debug!("espeak exited with {status}");
                    Err(SynthesisFailure::SynthesisFailed)
                }
                Some(Err(err)) => Err(SynthesisFailure::Other(format!("Failed waiting for espeak: {err}"))),
                None => {
                    let _ = child.kill().await;
                    Err(SynthesisFailure::Interrupted)
                }
            };
            let _ = done_tx.send(outcome);
        });

        Ok(done_rx)
    }

    fn cancel(&self) {
        if let Ok(mut guard) = self.active.lock() {
            guard.take();
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.signal_active(ProcessSignal::Stop);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.signal_active(ProcessSignal::Continue);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

fn speak_args(utterance: &Utterance) -> Vec<String> {
    let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).clamp(MIN_WORDS_PER_MINUTE, MAX_WORDS_PER_MINUTE);
    let pitch = (BASE_PITCH * utterance.pitch).clamp(0.0, MAX_PITCH);

    let mut args = vec!["--stdin".to_string()];
    if let Some(voice) = utterance.voice.as_ref() {
        args.push("-v".to_string());
        args.push(voice.id.clone());
    }
    args.push("-s".to_string());
    args.push(format!("{}", words_per_minute.round() as u32));
    args.push("-p".to_string());
    args.push(format!("{}", pitch.round() as u32));
    args
}

async fn list_voices(program: &str) -> Result<Vec<Voice>> {
    let output = Command::new(program)
        .arg("--voices")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to run {program} --voices"))?;
    if !output.status.success() {
        return Err(anyhow!("{program} --voices exited with {}", output.status));
    }
    Ok(parse_voice_listing(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the table printed by `espeak-ng --voices`:
/// `Pty Language Age/Gender VoiceName File Other Languages`.
fn parse_voice_listing(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let [_, lang, _, name, file, ..] = columns.as_slice() else {
                return None;
            };
            Some(Voice {
                id: (*file).to_string(),
                name: name.replace('_', " "),
                lang: (*lang).to_string(),
                is_default: *lang == DEFAULT_LANGUAGE,
                local_service: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  en              --/M      English_(Great_Britain) gmw/en            (en 2)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 garbage
";

    #[test]
    fn voice_listing_is_parsed() {
        let voices = parse_voice_listing(LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].name, "English (Great Britain)");
        assert_eq!(voices[1].id, "gmw/en");
        assert!(voices[1].is_default);
        assert_eq!(voices[2].lang, "en-us");
        assert!(!voices[2].is_default);
    }

    #[test]
    fn rate_and_pitch_map_to_espeak_units() {
        let utterance = Utterance {
            text: "hi".to_string(),
            voice: parse_voice_listing(LISTING).into_iter().nth(2),
            rate: 1.5,
            pitch: 2.5,
        };
        assert_eq!(speak_args(&utterance), vec!["--stdin", "-v", "gmw/en-US", "-s", "263", "-p", "99"]);

        let slow = Utterance {
            voice: None,
            rate: 0.1,
            pitch: 1.0,
            ..utterance
        };
        assert_eq!(speak_args(&slow), vec!["--stdin", "-s", "80", "-p", "50"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn utterance_started_while_paused_waits_for_resume() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fake-espeak");
        std::fs::write(&script, "#!/bin/sh\n[ \"$1\" = \"--voices\" ] && exit 0\nexec sleep 5\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod script");

        let engine = EspeakEngine::spawn(script.to_string_lossy());
        engine.pause();
        let done = engine
            .speak(Utterance {
                text: "hello".to_string(),
                voice: None,
                rate: 1.0,
                pitch: 1.0,
            })
            .expect("spawn fake synthesizer");
        assert!(engine.is_paused());

        engine.resume();
        assert!(!engine.is_paused());
        engine.cancel();
        let outcome = done.await.expect("watcher reports outcome");
        assert_eq!(outcome, Err(SynthesisFailure::Interrupted));
    }

    #[tokio::test]
    async fn missing_program_reports_synthesis_failure() {
        let engine = EspeakEngine::spawn("readaloud-no-such-synthesizer");
        let err = engine
            .speak(Utterance {
                text: "hello".to_string(),
                voice: None,
                rate: 1.0,
                pitch: 1.0,
            })
            .expect_err("spawn must fail");
        assert_eq!(err, SynthesisFailure::SynthesisFailed);
        assert!(!engine.is_paused());
    }
}
