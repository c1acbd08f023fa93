//! Routes the agent's voice from the session events to the speaker.

use shoplive_audio::PlaybackPipeline;
use shoplive_core::{CodecError, EventBus, SessionEvent, Subscription};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Where decoded agent audio goes.
pub trait PlaybackSink: Send + 'static {
    fn enqueue(&mut self, data: &str, sample_rate: Option<u32>) -> Result<(), CodecError>;
    fn flush(&mut self);
}

impl PlaybackSink for PlaybackPipeline {
    fn enqueue(&mut self, data: &str, sample_rate: Option<u32>) -> Result<(), CodecError> {
        self.enqueue_base64(data, sample_rate)
    }

    fn flush(&mut self) {
        PlaybackPipeline::flush(self);
    }
}

/// Subscribes to the two events the bridge consumes.
pub fn playback_subscription(bus: &EventBus<SessionEvent>) -> Subscription<SessionEvent> {
    bus.subscribe_to(&[
        SessionEvent::AUDIO_PLAYER_MESSAGE,
        SessionEvent::AGENT_MESSAGE_INTERRUPTED,
    ])
}

/// Feeds `audio-player-message` payloads to `sink` and flushes it on
/// `agent-message-interrupted`. The task hands the sink back once every bus
/// handle is gone.
pub fn spawn_playback_bridge<S: PlaybackSink>(
    mut events: Subscription<SessionEvent>,
    mut sink: S,
) -> JoinHandle<S> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::AudioPlayerMessage { data, sample_rate } => {
                    if let Err(e) = sink.enqueue(&data, sample_rate) {
                        warn!(error = %e, "Dropping undecodable agent audio");
                    }
                }
                SessionEvent::AgentMessageInterrupted => {
                    debug!("Agent interrupted; flushing playback");
                    sink.flush();
                }
                _ => {}
            }
        }
        debug!("Playback bridge stopped");
        sink
    })
}
