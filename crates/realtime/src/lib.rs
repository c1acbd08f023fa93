//! Client side of the shop agent's `/live` websocket.
//!
//! [`SessionTransport`] owns the socket and its reconnect policy, encodes
//! outbound envelopes, and publishes every decoded inbound frame on an
//! [`EventBus`](shoplive_core::EventBus) as [`SessionEvent`](shoplive_core::SessionEvent)s.

pub mod dispatch;
pub mod endpoint;
pub mod retry;
pub mod session;
pub mod socket;

pub use endpoint::{Endpoint, Mode};
pub use retry::{ConnectionState, ReconnectPolicy, RetryState};
pub use session::SessionTransport;
pub use socket::{Connector, Frame, FrameSink, FrameStream, SocketPair, TransportError, TungsteniteConnector};
