/// Errors from backend sessions.
///
/// Connection failures never reach callers of `connect`; the reconnect loop
/// consumes them and they show up as [`ConnectionState`](crate::ConnectionState)
/// transitions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The socket could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The socket did not open within the connect timeout.
    #[error("timed out connecting to {url}")]
    ConnectTimeout { url: String },

    /// The command backend has not assigned a rover id yet.
    #[error("not registered with the command backend")]
    NotRegistered,

    /// The media session was asked to register without a rover id.
    #[error("no rover id to register the media session with")]
    MissingIdentity,

    #[error("message encoding: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
