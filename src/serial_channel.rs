use crate::channel::{ByteChannel, ChannelError};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Fixed baud rate of the PmodAD1 bridge firmware.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Read timeout after which an idle stream is considered ended.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How to reach the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Device path such as `/dev/ttyUSB0` or `COM13`. `None` picks the first USB port.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    pub fn with_port(port: &str) -> Self {
        Self {
            port: Some(port.to_string()),
            ..Self::default()
        }
    }
}

/// `ByteChannel` over a real serial device.
pub struct SerialChannel {
    serial: Option<Box<dyn SerialPort>>,
    name: String,
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("open", &self.serial.is_some())
            .finish()
    }
}

impl SerialChannel {
    /// Open `port` with the baud rate and timeout from `config`.
    pub fn open(port: &str, config: &ChannelConfig) -> Result<Self, ChannelError> {
        log::debug!(
            "Opening {} at {} baud (timeout {:?})",
            port,
            config.baud_rate,
            config.read_timeout
        );
        let serial = serialport::new(port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;

        let mut channel = Self {
            serial: Some(serial),
            name: port.to_string(),
        };
        channel.flush_input()?;
        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop stale bytes left over from a previous session.
    fn flush_input(&mut self) -> Result<(), ChannelError> {
        self.port()?.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, ChannelError> {
        self.serial.as_mut().ok_or(ChannelError::Closed)
    }
}

/// Map a raw port read onto the channel contract.
///
/// Timeouts and disconnects (an unplugged adapter surfaces as `BrokenPipe`)
/// become an empty read. Every other I/O error is passed on.
pub fn read_outcome(result: std::io::Result<usize>) -> Result<usize, ChannelError> {
    match result {
        Ok(n) => Ok(n),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ) =>
        {
            log::debug!("Treating read error as end of stream: {}", e);
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

impl ByteChannel for SerialChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let serial = self.port()?;
        Write::write_all(&mut *serial, bytes)?;
        Write::flush(&mut *serial)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        read_outcome(Read::read(self.port()?, buf))
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        let mut serial = self.serial.take().ok_or(ChannelError::Closed)?;
        log::debug!("Closing {}", self.name);
        Write::flush(&mut serial)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.baud_rate, 230_400);
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert!(config.port.is_none());
    }

    #[test]
    fn test_with_port() {
        let config = ChannelConfig::with_port("/dev/ttyUSB0");
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
    }

    fn io_err(kind: ErrorKind) -> std::io::Result<usize> {
        Err(std::io::Error::new(kind, "port read failed"))
    }

    #[test]
    fn test_read_outcome_passes_data_through() {
        assert_eq!(read_outcome(Ok(3)).unwrap(), 3);
        assert_eq!(read_outcome(Ok(0)).unwrap(), 0);
    }

    #[test]
    fn test_timeout_and_disconnect_are_empty_reads() {
        for kind in [
            ErrorKind::TimedOut,
            ErrorKind::WouldBlock,
            ErrorKind::BrokenPipe,
            ErrorKind::UnexpectedEof,
            ErrorKind::ConnectionReset,
            ErrorKind::ConnectionAborted,
        ] {
            assert_eq!(read_outcome(io_err(kind)).unwrap(), 0, "{kind:?}");
        }
    }

    #[test]
    fn test_other_read_errors_propagate() {
        assert!(matches!(
            read_outcome(io_err(ErrorKind::PermissionDenied)),
            Err(ChannelError::Io(e)) if e.kind() == ErrorKind::PermissionDenied
        ));
    }

    /// Delivers its bytes, then reports the adapter as unplugged.
    struct UnpluggedPort {
        bytes: crate::channel::ReplayChannel,
        remaining: usize,
    }

    impl ByteChannel for UnpluggedPort {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
            self.bytes.write_all(bytes)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
            if self.remaining == 0 {
                return read_outcome(io_err(ErrorKind::BrokenPipe));
            }
            let n = self.bytes.read(buf)?;
            self.remaining -= n;
            read_outcome(Ok(n))
        }

        fn close(&mut self) -> Result<(), ChannelError> {
            self.bytes.close()
        }
    }

    #[test]
    fn test_unplugged_port_ends_stream() {
        use crate::acquisition::{Acquisition, AcquisitionConfig, Termination};

        let data: Vec<u8> = (0u8..18).collect();
        let mut port = UnpluggedPort {
            bytes: crate::channel::ReplayChannel::new(data),
            remaining: 18,
        };

        let report = Acquisition::new(AcquisitionConfig::default().without_settle())
            .streaming(&mut port)
            .unwrap();

        assert_eq!(report.session.len(), 9);
        assert_eq!(report.session.termination(), Termination::EndOfStream);
        assert!(report.failure.is_none());
        assert_eq!(port.bytes.close_count(), 1);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialChannel::open("/dev/does-not-exist-pmod", &ChannelConfig::default());
        assert!(result.is_err());
    }
}
