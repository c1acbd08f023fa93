//! Many-to-many publish/subscribe for session and capture events.
//!
//! The bus is an explicitly constructed handle: whoever owns the session
//! creates one and hands clones to the producers and consumers that need it.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// Default per-subscriber backlog before slow subscribers start skipping events.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Events that carry a stable, human-readable name.
pub trait NamedEvent: Clone + Send + 'static {
    fn name(&self) -> &'static str;
}

/// Cloneable publish/subscribe handle.
#[derive(Debug)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: NamedEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl<E: NamedEvent> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current subscriber. Never blocks, never fails;
    /// an event with no subscribers is simply dropped.
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Subscribes to every event.
    pub fn subscribe(&self) -> Subscription<E> {
        Subscription {
            rx: self.tx.subscribe(),
            names: None,
        }
    }

    /// Subscribes only to events whose [`NamedEvent::name`] is listed.
    pub fn subscribe_to(&self, names: &[&'static str]) -> Subscription<E> {
        Subscription {
            rx: self.tx.subscribe(),
            names: Some(names.to_vec()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    rx: broadcast::Receiver<E>,
    names: Option<Vec<&'static str>>,
}

impl<E: NamedEvent> Subscription<E> {
    /// Waits for the next matching event. Returns `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged behind; skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged behind; skipping events");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}

    fn matches(&self, event: &E) -> bool {
        match &self.names {
            None => true,
            Some(names) => names.contains(&event.name()),
        }
    }
}

/// Everything the session transport tells its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Open,
    Close,
    AgentMessage(Value),
    AgentMessageInterrupted,
    /// Base64 PCM for the playback pipeline.
    AudioPlayerMessage {
        data: String,
        sample_rate: Option<u32>,
    },
    UserMessage(Value),
    UserImage(Value),
    ImageUploaded,
    PresentItems(Value),
    SetProductGroup(Value),
    SetSessionId(Value),
    ShowSpinner(Value),
    ShowQueryMsg(Value),
    TurnComplete,
}

impl SessionEvent {
    pub const OPEN: &'static str = "open";
    pub const CLOSE: &'static str = "close";
    pub const AGENT_MESSAGE: &'static str = "agent-message";
    pub const AGENT_MESSAGE_INTERRUPTED: &'static str = "agent-message-interrupted";
    pub const AUDIO_PLAYER_MESSAGE: &'static str = "audio-player-message";
    pub const USER_MESSAGE: &'static str = "user-message";
    pub const USER_IMAGE: &'static str = "user-image";
    pub const IMAGE_UPLOADED: &'static str = "image-uploaded";
    pub const PRESENT_ITEMS: &'static str = "present-items";
    pub const SET_PRODUCT_GROUP: &'static str = "set-product-group";
    pub const SET_SESSION_ID: &'static str = "set-session-id";
    pub const SHOW_SPINNER: &'static str = "show-spinner";
    pub const SHOW_QUERY_MSG: &'static str = "show-query-msg";
    pub const TURN_COMPLETE: &'static str = "turn-complete";
}

impl NamedEvent for SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Open => Self::OPEN,
            Self::Close => Self::CLOSE,
            Self::AgentMessage(_) => Self::AGENT_MESSAGE,
            Self::AgentMessageInterrupted => Self::AGENT_MESSAGE_INTERRUPTED,
            Self::AudioPlayerMessage { .. } => Self::AUDIO_PLAYER_MESSAGE,
            Self::UserMessage(_) => Self::USER_MESSAGE,
            Self::UserImage(_) => Self::USER_IMAGE,
            Self::ImageUploaded => Self::IMAGE_UPLOADED,
            Self::PresentItems(_) => Self::PRESENT_ITEMS,
            Self::SetProductGroup(_) => Self::SET_PRODUCT_GROUP,
            Self::SetSessionId(_) => Self::SET_SESSION_ID,
            Self::ShowSpinner(_) => Self::SHOW_SPINNER,
            Self::ShowQueryMsg(_) => Self::SHOW_QUERY_MSG,
            Self::TurnComplete => Self::TURN_COMPLETE,
        }
    }
}
