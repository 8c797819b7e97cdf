use crate::channel::{ByteChannel, ChannelError};
use std::thread;
use std::time::Duration;

/// Acquisition behaviour the module can be switched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionMode {
    /// SPI register snapshot plus converted ADC value, 4 bytes per sample.
    RawDebug,
    /// FIR-filtered output, 2 bytes per sample.
    Streaming,
}

impl AcquisitionMode {
    pub fn command_byte(&self) -> u8 {
        match self {
            AcquisitionMode::RawDebug => b'D',
            AcquisitionMode::Streaming => b'F',
        }
    }

    /// Number of big-endian 16-bit fields in one frame.
    pub fn field_count(&self) -> usize {
        match self {
            AcquisitionMode::RawDebug => 2,
            AcquisitionMode::Streaming => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMode::RawDebug => "raw-debug",
            AcquisitionMode::Streaming => "streaming",
        }
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends the one-byte mode command and waits out the settling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelector {
    settle: Duration,
}

impl ModeSelector {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// A selector that starts reading immediately after the command.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Switch the module into `mode`. No acknowledgement is awaited.
    pub fn trigger<C: ByteChannel + ?Sized>(
        &self,
        channel: &mut C,
        mode: AcquisitionMode,
    ) -> Result<(), ChannelError> {
        log::debug!(
            "Sending '{}' to enter {} mode",
            mode.command_byte() as char,
            mode
        );
        channel.write_all(&[mode.command_byte()])?;

        if !self.settle.is_zero() {
            log::debug!("Waiting {:?} for the module to settle", self.settle);
            thread::sleep(self.settle);
        }
        Ok(())
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::immediate()
    }
}
