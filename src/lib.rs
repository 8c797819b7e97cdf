//! # PmodAD1 RS
//!
//! Host-side driver for a serial-attached PmodAD1 analog front end with an
//! optional FIR filter stage.
//!
//! The module is switched into an acquisition mode with a single command byte
//! and then streams fixed-width big-endian frames:
//!
//! - **Raw-debug** (`'D'`): 4 bytes per sample, the SPI register snapshot
//!   followed by the converted ADC value. A fixed number of samples is read.
//! - **Streaming** (`'F'`): 2 bytes per sample of FIR-filtered output, read
//!   until the stream times out, a sample cap is reached, or the run is
//!   cancelled.
//!
//! ## Features
//!
//! - **Port discovery**: Uses `serialport` to list and open devices
//! - **Byte-accurate framing**: Short reads end a session, never produce partial samples
//! - **Guaranteed release**: The channel is closed exactly once on every exit path
//! - **Cooperative cancellation**: A shared token is checked between frames
//! - **DataFrame output**: Sessions convert to `polars` DataFrames
//!
//! ## Examples
//!
//! ### Streaming capture to a file
//!
//! ```rust,no_run
//! use pmod_ad1_rs::{Acquisition, AcquisitionConfig, ChannelConfig, DecimalLineSink, PmodConnector, SessionSink};
//!
//! let channel = PmodConnector::open(&ChannelConfig::with_port("/dev/ttyUSB0"))?;
//! let report = Acquisition::new(AcquisitionConfig::default()).streaming(channel)?;
//!
//! let mut sink = DecimalLineSink::create("raw_ad_fir.txt")?;
//! let saved = sink.emit(&report.session)?;
//! println!("Saved {} samples ({})", saved, report.session.termination());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Replaying a captured dump
//!
//! ```rust
//! use pmod_ad1_rs::{Acquisition, AcquisitionConfig, ConsoleSink, ReplayChannel, SessionSink, Termination};
//!
//! let bytes = vec![0x80, 0x01, 0x07, 0xD0];
//! let report = Acquisition::new(AcquisitionConfig::default())
//!     .raw_debug(ReplayChannel::new(bytes))
//!     .unwrap();
//!
//! assert_eq!(report.session.termination(), Termination::EndOfStream);
//! ConsoleSink::stdout().emit(&report.session).unwrap(); // Sample 0: Raw=0x8001, ADC=2000
//! ```

pub mod acquisition;
pub mod channel;
pub mod frame_decoder;
pub mod mode_selector;
pub mod pmod_connector;
pub mod serial_channel;
pub mod sink;

// Re-export the main types for convenience
pub use acquisition::{
    Acquisition, AcquisitionConfig, AcquisitionError, AcquisitionReport, AcquisitionSession,
    CancellationToken, Termination,
};

pub use channel::{ByteChannel, ChannelError, ReplayChannel};

pub use frame_decoder::{read_frame, read_sample, DebugSample, Decoded, FilteredSample, Sample};

pub use mode_selector::{AcquisitionMode, ModeSelector};

pub use pmod_connector::{ConnectorError, PmodConnector, PmodPort};

pub use serial_channel::{ChannelConfig, SerialChannel};

pub use sink::{ConsoleSink, DecimalLineSink, SessionFrame, SessionSink, SinkError};
