//! # shard-gateway
//!
//! Gateway session manager for one shard: connection lifecycle, heartbeats, resume,
//! event dispatch, and rate-limited writes.

pub mod collaborators;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod model;
pub mod protocol;
pub mod ratelimit;
pub mod session;
pub mod transport;

pub use collaborators::{GatewayLocator, HttpGatewayLocator, StateTracker, StaticGatewayLocator};
pub use dispatcher::{DispatchReport, HandlerKey, HandlerRegistry, HandlerToken};
pub use error::{GatewayError, GatewayResult, HandshakeError, ProtocolError, TransportError};
pub use events::{Event, EventPayload, GatewayEventType, ANY_EVENT};
pub use protocol::{CloseCode, GatewayMessage, Intents, OpCode};
pub use session::{ConnectionNotice, ConnectionState, Session, SessionBuilder, SessionConfig};
