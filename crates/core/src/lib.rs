//! Shared building blocks for the live shopping client: the wire envelope,
//! sample codecs, the event bus and a mockable clock.

pub mod clock;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod events;

pub use clock::{Clock, ManualClock, TokioClock};
pub use envelope::{Envelope, Inbound, InboundCommand, OutboundCommand, WireEnvelope};
pub use error::{CodecError, MalformedMessageError};
pub use events::{EventBus, NamedEvent, SessionEvent, Subscription};
