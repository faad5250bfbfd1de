use std::time::Duration;

use crate::error::Result;

/// A byte-oriented duplex channel to the motor controller board.
///
/// Implementations block for at most the given timeout. `read` returning
/// `Ok(0)` means nothing arrived inside the window; it is not an error.
pub trait SerialTransport: Send {
    /// Write the whole buffer or fail.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Read whatever the device has sent, up to `buf.len()` bytes.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the device. Further writes fail with [`TransportError::Closed`].
    ///
    /// [`TransportError::Closed`]: crate::TransportError::Closed
    fn close(&mut self) -> Result<()>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(bytes, timeout)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
