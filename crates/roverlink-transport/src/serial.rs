use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialTransport;

/// Line settings for the controller board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Baud rate. The stock firmware listens at 9600.
    pub baud_rate: u32,
}

impl SerialConfig {
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", Self::DEFAULT_BAUD_RATE)
    }
}

/// [`SerialTransport`] over a real serial device (8N1, no flow control).
pub struct SerialPortTransport {
    port: Option<Box<dyn SerialPort>>,
    path: String,
}

impl SerialPortTransport {
    /// Open the device and assert DTR/RTS so the board leaves reset.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut port = serialport::new(&config.path, config.baud_rate)
            .timeout(Duration::from_millis(200))
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|source| TransportError::Open {
                path: config.path.clone(),
                source,
            })?;

        port.write_data_terminal_ready(true)
            .and_then(|()| port.write_request_to_send(true))
            .map_err(|source| TransportError::Configure {
                path: config.path.clone(),
                source,
            })?;

        info!(path = %config.path, baud = config.baud_rate, "serial device opened");

        Ok(Self {
            port: Some(port),
            path: config.path.clone(),
        })
    }

    /// Device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl SerialTransport for SerialPortTransport {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|err| TransportError::Write(err.into()))?;
        port.write_all(bytes).map_err(TransportError::Write)?;
        port.flush().map_err(TransportError::Write)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|err| TransportError::Read(err.into()))?;
        loop {
            match port.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(0),
                Err(err) => return Err(TransportError::Read(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(path = %self.path, "serial device closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("path", &self.path)
            .field("open", &self.port.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_firmware() {
        let config = SerialConfig::default();
        assert_eq!(config.path, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    #[cfg(unix)]
    fn open_missing_device_reports_path() {
        let config = SerialConfig::new("/dev/roverlink-missing-device", 9600);
        let err = SerialPortTransport::open(&config).unwrap_err();
        match err {
            TransportError::Open { path, .. } => assert_eq!(path, config.path),
            other => panic!("expected open error, got {other:?}"),
        }
    }
}
