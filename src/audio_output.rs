use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::PlaybackError;
use crate::process_control::{signal_process, ProcessSignal};

const DEFAULT_PLAYER: &str = "ffplay";
const DEFAULT_PLAYER_ARGS: [&str; 7] = ["-nodisp", "-autoexit", "-loglevel", "quiet", "-af", "atempo={rate}", "{file}"];
const RATE_PLACEHOLDER: &str = "{rate}";
const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl SynthesizedAudio {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self { bytes, content_type }
    }

    fn file_suffix(&self) -> &'static str {
        let content_type = self.content_type.as_deref().unwrap_or_default().to_ascii_lowercase();
        if content_type.contains("wav") {
            ".wav"
        } else if content_type.contains("ogg") || content_type.contains("opus") {
            ".ogg"
        } else if content_type.contains("flac") {
            ".flac"
        } else {
            ".mp3"
        }
    }
}

pub type AudioEnded = oneshot::Receiver<Result<(), PlaybackError>>;

#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn load(&self, audio: SynthesizedAudio, playback_rate: f32) -> Result<Box<dyn AudioElement>, PlaybackError>;
}

/// One loaded piece of audio. `play` starts playback or resumes it after
/// `pause`; `ended` hands out the completion signal once.
#[async_trait]
pub trait AudioElement: Send {
    async fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self) -> Result<(), PlaybackError>;
    fn is_paused(&self) -> bool;
    fn ended(&mut self) -> Option<AudioEnded>;
    /// Stops playback and frees the temporary media. Safe to call repeatedly.
    fn release(&mut self);
}

#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self {
            program: DEFAULT_PLAYER.to_string(),
            args: DEFAULT_PLAYER_ARGS.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

impl CommandPlayer {
    /// `args` may contain `{rate}` and `{file}`; without `{file}` the path is
    /// appended last.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn resolve_args(&self, file: &Path, playback_rate: f32) -> Vec<String> {
        let file = file.to_string_lossy();
        let rate = format!("{playback_rate:.3}");
        let mut resolved: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(RATE_PLACEHOLDER, &rate).replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            resolved.push(file.into_owned());
        }
        resolved
    }
}

#[async_trait]
impl AudioOutput for CommandPlayer {
    async fn load(&self, audio: SynthesizedAudio, playback_rate: f32) -> Result<Box<dyn AudioElement>, PlaybackError> {
        let mut file = tempfile::Builder::new()
            .prefix("readaloud-")
            .suffix(audio.file_suffix())
            .tempfile()
            .map_err(|err| PlaybackError::Audio(format!("failed to create temp audio file: {err}")))?;
        file.write_all(&audio.bytes)
            .and_then(|()| file.flush())
            .map_err(|err| PlaybackError::Audio(format!("failed to write temp audio file: {err}")))?;

        let args = self.resolve_args(file.path(), playback_rate);
        let (ended_tx, ended_rx) = oneshot::channel();
        Ok(Box::new(PlayerElement {
            program: self.program.clone(),
            args,
            file: Some(file),
            running: None,
            paused: false,
            ended_tx: Some(ended_tx),
            ended_rx: Some(ended_rx),
        }))
    }
}

struct RunningPlayer {
    pid: Option<u32>,
    // Dropping the sender makes the watcher kill the child.
    _kill: oneshot::Sender<()>,
}

struct PlayerElement {
    program: String,
    args: Vec<String>,
    file: Option<NamedTempFile>,
    running: Option<RunningPlayer>,
    paused: bool,
    ended_tx: Option<oneshot::Sender<Result<(), PlaybackError>>>,
    ended_rx: Option<AudioEnded>,
}

impl PlayerElement {
    fn start(&mut self) -> Result<(), PlaybackError> {
        if self.file.is_none() {
            return Err(PlaybackError::Audio("audio was already released".to_string()));
        }
        let ended_tx = self
            .ended_tx
            .take()
            .ok_or_else(|| PlaybackError::Audio("audio already played".to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| PlaybackError::Audio(format!("failed to start {}: {err}", self.program)))?;
        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let program = self.program.clone();

        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };
            let outcome = match finished {
                Some(Ok(status)) if status.success() => Ok(()),
                Some(Ok(status)) => Err(PlaybackError::Audio(format!("{program} exited with {status}"))),
                Some(Err(err)) => Err(PlaybackError::Audio(format!("failed waiting for {program}: {err}"))),
                None => {
                    let _ = child.kill().await;
                    Err(PlaybackError::Cancelled)
                }
            };
            let _ = ended_tx.send(outcome);
        });

        debug!(program = %self.program, ?pid, "audio player started");
        self.running = Some(RunningPlayer { pid, _kill: kill_tx });
        Ok(())
    }

    fn signal(&self, signal: ProcessSignal) -> Result<(), PlaybackError> {
        let Some(pid) = self.running.as_ref().and_then(|running| running.pid) else {
            return Ok(());
        };
        signal_process(pid, signal).map_err(|err| PlaybackError::Audio(format!("{err:#}")))
    }
}

#[async_trait]
impl AudioElement for PlayerElement {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        if self.running.is_none() {
            return self.start();
        }
        if self.paused {
            self.signal(ProcessSignal::Continue)?;
            self.paused = false;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        if self.running.is_none() || self.paused {
            return Ok(());
        }
        self.signal(ProcessSignal::Stop)?;
        self.paused = true;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn ended(&mut self) -> Option<AudioEnded> {
        self.ended_rx.take()
    }

    fn release(&mut self) {
        self.running = None;
        self.paused = false;
        self.ended_tx = None;
        if let Some(file) = self.file.take() {
            if let Err(err) = file.close() {
                warn!("Failed to remove temp audio file: {err}");
            }
        }
    }
}

impl Drop for PlayerElement {
    fn drop(&mut self) {
        self.release();
    }
}
