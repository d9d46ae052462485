use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisFailure {
    #[error("interrupted")]
    Interrupted,
    #[error("canceled")]
    Canceled,
    #[error("synthesis-failed")]
    SynthesisFailed,
    #[error("{0}")]
    Other(String),
}

impl SynthesisFailure {
    /// Failures worth one retry of the whole chunk sequence with another voice.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Canceled | Self::SynthesisFailed)
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("{0}")]
    Configuration(String),

    #[error("{}", transport_message(provider, *status, message))]
    Transport {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("playback-cancelled")]
    Cancelled,

    #[error("{0}")]
    Synthesis(#[from] SynthesisFailure),

    #[error("Audio playback failed: {0}")]
    Audio(String),
}

fn transport_message(provider: &str, status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("{provider} TTS failed ({code})"),
        None => format!("{provider} TTS request failed: {message}"),
    }
}

impl PlaybackError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Text shown to the user. The local engine going silent gets a hint on
    /// how to get a working system voice instead of the raw engine code.
    pub fn user_message(&self) -> String {
        match self {
            Self::Synthesis(SynthesisFailure::SynthesisFailed) => local_engine_hint().to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn transport(provider: &'static str, err: reqwest::Error) -> Self {
        Self::Transport {
            provider,
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

fn local_engine_hint() -> &'static str {
    if cfg!(target_os = "linux") {
        "System voice unavailable. Install espeak-ng (and speech-dispatcher) or switch to a remote provider."
    } else if cfg!(target_os = "macos") {
        "System voice unavailable. Install espeak-ng with Homebrew or switch to a remote provider."
    } else {
        "System voice unavailable. Install espeak-ng or switch to a remote provider."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_mentions_status_code() {
        let err = PlaybackError::Transport {
            provider: "OpenAI",
            status: Some(401),
            message: "Unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "OpenAI TTS failed (401)");
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn silent_local_engine_gets_a_hint() {
        let err = PlaybackError::from(SynthesisFailure::SynthesisFailed);
        assert!(err.user_message().starts_with("System voice unavailable."));

        let other = PlaybackError::from(SynthesisFailure::Other("voice busy".to_string()));
        assert_eq!(other.user_message(), "voice busy");
    }

    #[test]
    fn only_engine_hiccups_are_transient() {
        assert!(SynthesisFailure::Interrupted.is_transient());
        assert!(SynthesisFailure::Canceled.is_transient());
        assert!(SynthesisFailure::SynthesisFailed.is_transient());
        assert!(!SynthesisFailure::Other("audio-busy".to_string()).is_transient());
    }
}
