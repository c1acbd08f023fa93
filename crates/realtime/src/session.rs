//! The session transport: one socket, reconnect policy, and the outbound API.
//!
//! A [`SessionTransport`] is a cheap, cloneable handle. All socket work happens
//! in a driver task that owns the socket and the connection state machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --open--> Open --close--> Disconnected (reconnect scheduled)
//! Open --close()--> Closing --closed--> Disconnected (no reconnect)
//! ```
//!
//! Handle calls are queued on an unbounded channel, so they never block and
//! are applied in call order.

use crate::retry::{ConnectionState, ReconnectPolicy, RetryState};
use crate::socket::{Connector, Frame, SocketPair};
use crate::{dispatch, endpoint::Endpoint};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shoplive_core::{
    Clock, EventBus, OutboundCommand, SessionEvent, Subscription, TokioClock, codec, envelope,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum Control {
    Connect,
    Close,
    Send(String),
}

/// Handle to a live session with the agent endpoint.
#[derive(Clone)]
pub struct SessionTransport {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
    bus: EventBus<SessionEvent>,
    endpoint: Endpoint,
}

impl SessionTransport {
    /// Creates the transport and spawns its driver on the current tokio runtime.
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn new<C: Connector>(endpoint: Endpoint, connector: C, bus: EventBus<SessionEvent>) -> Self {
        Self::with_policy(
            endpoint,
            connector,
            bus,
            ReconnectPolicy::default(),
            Arc::new(TokioClock),
        )
    }

    pub fn with_policy<C: Connector>(
        endpoint: Endpoint,
        connector: C,
        bus: EventBus<SessionEvent>,
        policy: ReconnectPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver {
            url: endpoint.url(),
            connector,
            bus: bus.clone(),
            state: state_tx,
            control: control_rx,
            retry: RetryState::new(),
            policy,
            clock,
            reconnect_in: None,
        };
        let span = info_span!("live_session", url = %endpoint.url());
        tokio::spawn(driver.run().instrument(span));

        Self {
            control: control_tx,
            state: state_rx,
            bus,
            endpoint,
        }
    }

    /// Opens the socket. A no-op while already connecting or open.
    pub fn connect(&self) {
        self.push(Control::Connect);
    }

    /// Closes the socket without scheduling a reconnect. Also cancels a pending reconnect.
    pub fn close(&self) {
        self.push(Control::Close);
    }

    /// Sends a raw frame. Dropped silently unless the socket is open when the
    /// driver gets to it; watch `open`/`close` events for delivery context.
    pub fn send(&self, raw: impl Into<String>) {
        self.push(Control::Send(raw.into()));
    }

    /// Sends a user text message.
    pub fn send_message(&self, text: &str) {
        self.send(envelope::encode_text(text));
    }

    /// Switches the agent between spoken and text replies.
    pub fn set_mode(&self, audio: bool) {
        self.send(OutboundCommand::SetAudio(audio).encode());
    }

    /// Requests a generated image for a product.
    pub fn generate_image(&self, product_id: impl Into<String>) {
        self.send(OutboundCommand::GenerateImage(product_id.into()).encode());
    }

    pub fn set_user_location(&self, location: Value) {
        self.send(OutboundCommand::SetUserLocation(location).encode());
    }

    /// Uploads a JPEG image for the agent to look at.
    pub fn send_image(&self, jpeg: &[u8]) {
        self.send(envelope::encode_image_jpeg(&codec::encode_base64(jpeg)));
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.bus
    }

    pub fn subscribe(&self) -> Subscription<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn push(&self, control: Control) {
        if self.control.send(control).is_err() {
            debug!("Session driver has stopped; ignoring call");
        }
    }
}

/// How a connection attempt ended.
enum Outcome {
    /// Closed by the remote or by a fault; a reconnect is scheduled.
    Dropped,
    /// Closed on request; stay disconnected.
    ClosedByUser,
    /// Every handle is gone; the driver should exit.
    Shutdown,
}

struct Driver<C> {
    url: String,
    connector: C,
    bus: EventBus<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    control: mpsc::UnboundedReceiver<Control>,
    retry: RetryState,
    policy: ReconnectPolicy,
    clock: Arc<dyn Clock>,
    reconnect_in: Option<std::time::Duration>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            let control = match self.reconnect_in.take() {
                Some(delay) => {
                    let timer = tokio::time::sleep(delay);
                    tokio::pin!(timer);
                    // Stay on this timer until it fires, or an explicit
                    // connect or close preempts it.
                    loop {
                        tokio::select! {
                            _ = &mut timer => break Some(Control::Connect),
                            control = self.control.recv() => match control {
                                Some(Control::Send(_)) => {
                                    debug!("Dropping outbound frame; socket is not open");
                                }
                                Some(Control::Connect) => {
                                    debug!("Explicit connect; skipping reconnect delay");
                                    break Some(Control::Connect);
                                }
                                other => break other,
                            },
                        }
                    }
                }
                None => self.control.recv().await,
            };

            match control {
                None => break,
                Some(Control::Connect) => {
                    if let Outcome::Shutdown = self.run_connection().await {
                        break;
                    }
                }
                Some(Control::Close) => {
                    debug!("Close requested while disconnected; reconnect cancelled");
                }
                Some(Control::Send(_)) => {
                    debug!("Dropping outbound frame; socket is not open");
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("Session driver stopped");
    }

    async fn run_connection(&mut self) -> Outcome {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting");

        let result = {
            let attempt = self.connector.connect(&self.url);
            tokio::pin!(attempt);
            loop {
                tokio::select! {
                    result = &mut attempt => break result,
                    control = self.control.recv() => match control {
                        None => return Outcome::Shutdown,
                        Some(Control::Close) => {
                            info!("Connection attempt abandoned on request");
                            self.set_state(ConnectionState::Disconnected);
                            return Outcome::ClosedByUser;
                        }
                        Some(Control::Connect) => {}
                        Some(Control::Send(_)) => {
                            debug!("Dropping outbound frame; socket is still connecting");
                        }
                    },
                }
            }
        };

        let SocketPair {
            mut sink,
            mut stream,
        } = match result {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                return self.on_dropped();
            }
        };

        self.retry.on_open(self.clock.now());
        self.set_state(ConnectionState::Open);
        info!("Websocket open");
        self.bus.emit(SessionEvent::Open);

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(raw))) => dispatch::dispatch(&raw, &self.bus),
                    Some(Ok(Frame::Close)) | None => {
                        info!("Websocket closed by remote");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Websocket error");
                        break;
                    }
                },
                control = self.control.recv() => match control {
                    Some(Control::Send(raw)) => {
                        if let Err(e) = sink.send(raw).await {
                            warn!(error = %e, "Websocket send failed");
                            break;
                        }
                    }
                    Some(Control::Connect) => {}
                    Some(Control::Close) => {
                        self.set_state(ConnectionState::Closing);
                        if let Err(e) = sink.close().await {
                            debug!(error = %e, "Error while closing websocket");
                        }
                        self.set_state(ConnectionState::Disconnected);
                        info!("Websocket closed on request");
                        self.bus.emit(SessionEvent::Close);
                        return Outcome::ClosedByUser;
                    }
                    None => {
                        let _ = sink.close().await;
                        return Outcome::Shutdown;
                    }
                },
            }
        }
        self.on_dropped()
    }

    fn on_dropped(&mut self) -> Outcome {
        let delay = self.retry.on_close(self.clock.now(), &self.policy);
        self.reconnect_in = Some(delay);
        self.set_state(ConnectionState::Disconnected);
        info!(
            retry_count = self.retry.retry_count(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.bus.emit(SessionEvent::Close);
        Outcome::Dropped
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}
