use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Processing,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Processing => "Processing",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackEvent {
    StateChanged { state: PlaybackState },
    Error { message: String },
    ErrorCleared,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PlaybackEvent);
}

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PlaybackEvent) {
        let _ = self.tx.send(event);
    }
}

pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::StateChanged { state } => info!(?state, "playback state changed"),
            PlaybackEvent::Error { message } => warn!(%message, "playback error"),
            PlaybackEvent::ErrorCleared => info!("playback error cleared"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_tagged_json() {
        let payload = serde_json::to_value(PlaybackEvent::StateChanged {
            state: PlaybackState::Playing,
        })
        .expect("serialize event");
        assert_eq!(payload, serde_json::json!({ "type": "STATE_CHANGED", "state": "playing" }));

        let payload = serde_json::to_value(PlaybackEvent::ErrorCleared).expect("serialize event");
        assert_eq!(payload, serde_json::json!({ "type": "ERROR_CLEARED" }));
    }

    #[test]
    fn status_labels_match_the_controls() {
        assert_eq!(PlaybackState::Idle.status_label(), "");
        assert_eq!(PlaybackState::Paused.status_label(), "Paused");
        TracingSink.emit(PlaybackEvent::ErrorCleared);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(PlaybackEvent::Error {
            message: "boom".to_string(),
        });
        assert_eq!(
            rx.recv().await,
            Some(PlaybackEvent::Error {
                message: "boom".to_string()
            })
        );
    }
}
