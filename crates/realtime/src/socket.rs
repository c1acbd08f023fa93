//! The socket seam: anything that can open a text-frame duplex to a URL.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use std::pin::Pin;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::debug;

/// Socket-level failures. These never reach event subscribers; the transport
/// folds them into a `close`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("socket closed")]
    Closed,
}

/// One inbound frame of interest to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Both halves of an open socket.
pub struct SocketPair {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens sockets for the transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<SocketPair, TransportError>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketPair, TransportError> {
        let (ws_stream, response) = connect_async(url).await?;
        debug!(status = %response.status(), "Websocket handshake complete");
        let (ws_tx, ws_rx) = ws_stream.split();

        let sink = ws_tx
            .sink_map_err(TransportError::from)
            .with(|text: String| future::ready(Ok::<_, TransportError>(WsMessage::Text(text.into()))));

        let stream = ws_rx.filter_map(|msg| {
            future::ready(match msg {
                Ok(WsMessage::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(WsMessage::Close(_)) => Some(Ok(Frame::Close)),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(SocketPair {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! An in-memory connector whose "server" side is driven by the test.

    use super::*;
    use futures::channel::mpsc as fmpsc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// The server's view of one accepted connection.
    pub struct ServerSide {
        pub accepted_at: Instant,
        pub outbound: fmpsc::UnboundedReceiver<String>,
        pub inbound: fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    }

    impl ServerSide {
        pub fn push_text(&self, raw: &str) {
            let _ = self.inbound.unbounded_send(Ok(Frame::Text(raw.to_string())));
        }

        pub fn push_error(&self) {
            let _ = self.inbound.unbounded_send(Err(TransportError::Closed));
        }
    }

    pub struct MockConnector {
        accepted: mpsc::UnboundedSender<ServerSide>,
        refusals: Arc<AtomicUsize>,
        stalls: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    pub struct MockServer {
        pub accepted: mpsc::UnboundedReceiver<ServerSide>,
        refusals: Arc<AtomicUsize>,
        stalls: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
    }

    impl MockServer {
        /// Makes the next `n` connection attempts fail.
        pub fn refuse_next(&self, n: usize) {
            self.refusals.store(n, Ordering::SeqCst);
        }

        /// Makes the next `n` connection attempts hang forever.
        pub fn stall_next(&self, n: usize) {
            self.stalls.store(n, Ordering::SeqCst);
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    pub fn mock_pair() -> (MockConnector, MockServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let refusals = Arc::new(AtomicUsize::new(0));
        let stalls = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            MockConnector {
                accepted: tx,
                refusals: refusals.clone(),
                stalls: stalls.clone(),
                attempts: attempts.clone(),
            },
            MockServer {
                accepted: rx,
                refusals,
                stalls,
                attempts,
            },
        )
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _url: &str) -> Result<SocketPair, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(TransportError::Closed);
            }
            let stalled = self
                .stalls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if stalled {
                futures::future::pending::<()>().await;
            }

            let (out_tx, out_rx) = fmpsc::unbounded::<String>();
            let (in_tx, in_rx) = fmpsc::unbounded::<Result<Frame, TransportError>>();
            let _ = self.accepted.send(ServerSide {
                accepted_at: Instant::now(),
                outbound: out_rx,
                inbound: in_tx,
            });
            Ok(SocketPair {
                sink: Box::pin(out_tx.sink_map_err(|_| TransportError::Closed)),
                stream: Box::pin(in_rx),
            })
        }
    }
}
