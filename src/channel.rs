use std::collections::VecDeque;

/// A blocking, byte-oriented duplex transport to the peripheral.
///
/// `read` blocks up to the channel's read timeout. A timeout or a
/// disconnect is reported as a read of zero bytes, never as an error.
pub trait ByteChannel {
    /// Write the whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Read up to `buf.len()` bytes. Returns `Ok(0)` on timeout or disconnect.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;

    /// Release the transport.
    fn close(&mut self) -> Result<(), ChannelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel already closed")]
    Closed,
}

impl<C: ByteChannel + ?Sized> ByteChannel for &mut C {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read(buf)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }
}

impl<C: ByteChannel + ?Sized> ByteChannel for Box<C> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read(buf)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        (**self).close()
    }
}

/// In-memory channel that replays a fixed byte script.
///
/// Every written byte is recorded and every `close()` call is counted, which
/// makes it usable both for offline replay of a captured dump and for
/// exercising the acquisition loop without hardware.
#[derive(Debug, Default)]
pub struct ReplayChannel {
    script: VecDeque<u8>,
    cycle: Option<Vec<u8>>,
    written: Vec<u8>,
    close_count: usize,
    fail_on_close: bool,
    fail_after: Option<usize>,
    bytes_read: usize,
}

impl ReplayChannel {
    /// Replay `bytes` once, then behave as a timed-out stream.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            script: bytes.into().into(),
            ..Self::default()
        }
    }

    /// Replay `pattern` forever; the stream never ends on its own.
    pub fn endless(pattern: impl Into<Vec<u8>>) -> Self {
        let pattern = pattern.into();
        Self {
            script: pattern.iter().copied().collect(),
            cycle: (!pattern.is_empty()).then_some(pattern),
            ..Self::default()
        }
    }

    /// Make `close()` report an I/O error (it is still counted).
    pub fn failing_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    /// Make reads fail with an I/O error once `n` bytes have been delivered.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Bytes written to the channel so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }

    pub fn is_closed(&self) -> bool {
        self.close_count > 0
    }
}

impl ByteChannel for ReplayChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        if self.fail_after.is_some_and(|n| self.bytes_read >= n) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "replay channel failure",
            )));
        }

        let mut n = 0;
        while n < buf.len() {
            if self.script.is_empty() {
                match &self.cycle {
                    Some(pattern) => self.script.extend(pattern.iter().copied()),
                    None => break,
                }
            }
            match self.script.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        self.bytes_read += n;
        Ok(n)
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.close_count += 1;
        if self.fail_on_close {
            return Err(ChannelError::Io(std::io::Error::other(
                "replay channel refused to close",
            )));
        }
        Ok(())
    }
}
