/// Errors that can occur on the serial transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: serialport::Error,
    },

    /// The port opened but its line settings could not be applied.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: String,
        source: serialport::Error,
    },

    /// Writing to the device failed or timed out.
    #[error("serial write failed: {0}")]
    Write(std::io::Error),

    /// Reading from the device failed.
    #[error("serial read failed: {0}")]
    Read(std::io::Error),

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether this error means the device link itself is gone.
    ///
    /// A write-level fault is connection-fatal: callers drop the transport
    /// and report the device as lost.
    pub fn is_write_fault(&self) -> bool {
        matches!(self, TransportError::Write(_) | TransportError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
