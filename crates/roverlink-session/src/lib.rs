//! Backend sessions for a remotely operated rover.
//!
//! Two independent WebSocket sessions talk to the backend: the command
//! session registers the rover by name, receives rover commands and motor
//! mappings, and sends telemetry; the media session registers with the rover
//! id the command session obtained and streams JPEG frames. Both keep a
//! 30 second heartbeat and reconnect with exponential back-off.
//!
//! [`SessionCoordinator`] is the only link between the two: it connects the
//! media session once the command session has an identity.

pub mod backoff;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod link;
pub mod media;
pub mod messages;
pub mod session;

pub use backoff::{ReconnectPolicy, BASE_DELAY, MAX_DELAY};
pub use command::{CommandHandler, CommandRole, CommandSession};
pub use config::BackendConfig;
pub use coordinator::SessionCoordinator;
pub use error::{Result, SessionError};
pub use link::{Dialer, Incoming, Link, Outgoing, WsDialer};
pub use media::{FrameSource, MediaRole, MediaSession, StreamingState, FRAME_INTERVAL};
pub use messages::{
    encode_media_frame, CommandInbound, CommandOutbound, MediaInbound, MediaOutbound,
    TelemetryData, MEDIA_FRAME_TYPE,
};
pub use session::{
    BackendSession, ConnectionState, DisconnectReason, Outbox, SessionRole, CONNECT_TIMEOUT,
    HEARTBEAT_INTERVAL,
};
