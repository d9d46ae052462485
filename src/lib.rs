pub mod audio_output;
pub mod chunker;
pub mod error;
pub mod espeak_engine;
pub mod events;
pub mod local_engine;
pub mod orchestrator;
pub mod process_control;
pub mod providers;
pub mod session;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use audio_output::{AudioElement, AudioOutput, CommandPlayer, SynthesizedAudio};
pub use error::{PlaybackError, SynthesisFailure};
pub use espeak_engine::EspeakEngine;
pub use events::{ChannelSink, EventSink, PlaybackEvent, PlaybackState, TracingSink};
pub use local_engine::{SpeechEngine, Utterance, Voice};
pub use orchestrator::{ReadAloud, SpeakOutcome};
pub use settings::{PlaybackOptions, ProviderKind, Settings};
