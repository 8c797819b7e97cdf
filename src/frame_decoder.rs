//! Assembles fixed-width frames of big-endian 16-bit fields from a [`ByteChannel`].
//!
//! The wire protocol carries no sync marker, checksum or sequence number. A
//! dropped byte shifts every following field; the decoder does not try to
//! recover alignment.

use crate::channel::{ByteChannel, ChannelError};

/// One decoded frame, fields in the order received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub fields: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<S> {
    Sample(S),
    /// No further complete frame is available.
    EndOfStream,
}

impl<S> Decoded<S> {
    pub fn into_sample(self) -> Option<S> {
        match self {
            Decoded::Sample(s) => Some(s),
            Decoded::EndOfStream => None,
        }
    }
}

/// Raw-debug frame: `[raw_high, raw_low, adc_high, adc_low]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSample {
    /// SPI register snapshot.
    pub raw: u16,
    /// Converted measurement.
    pub adc: u16,
}

/// Streaming frame: `[value_high, value_low]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilteredSample(pub u16);

impl FilteredSample {
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// A typed view over a frame with a fixed number of fields.
pub trait FrameLayout: Sized {
    const FIELD_COUNT: usize;

    /// Build from exactly `FIELD_COUNT` fields.
    fn from_fields(fields: &[u16]) -> Self;
}

impl FrameLayout for DebugSample {
    const FIELD_COUNT: usize = 2;

    fn from_fields(fields: &[u16]) -> Self {
        Self {
            raw: fields[0],
            adc: fields[1],
        }
    }
}

impl FrameLayout for FilteredSample {
    const FIELD_COUNT: usize = 1;

    fn from_fields(fields: &[u16]) -> Self {
        Self(fields[0])
    }
}

/// Read one byte, `None` on timeout or disconnect.
fn read_byte<C: ByteChannel + ?Sized>(channel: &mut C) -> Result<Option<u8>, ChannelError> {
    let mut byte = [0u8; 1];
    match channel.read(&mut byte)? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

/// Read one big-endian 16-bit field, `None` if either byte is missing.
fn read_field<C: ByteChannel + ?Sized>(channel: &mut C) -> Result<Option<u16>, ChannelError> {
    let Some(high) = read_byte(channel)? else {
        return Ok(None);
    };
    let Some(low) = read_byte(channel)? else {
        log::trace!("Stream ended between the two bytes of a field");
        return Ok(None);
    };
    Ok(Some(u16::from_be_bytes([high, low])))
}

/// Read `field_count` fields into `out`. Returns `false` on a short read.
fn read_fields_into<C: ByteChannel + ?Sized>(
    channel: &mut C,
    out: &mut [u16],
) -> Result<bool, ChannelError> {
    for slot in out.iter_mut() {
        match read_field(channel)? {
            Some(value) => *slot = value,
            None => return Ok(false),
        }
    }
    Ok(true)
}

/// Decode one frame of `field_count` fields.
///
/// A short read at any byte position yields [`Decoded::EndOfStream`]; bytes
/// already consumed for the incomplete frame are discarded, never retried.
pub fn read_sample<C: ByteChannel + ?Sized>(
    channel: &mut C,
    field_count: usize,
) -> Result<Decoded<Sample>, ChannelError> {
    let mut fields = vec![0u16; field_count];
    if read_fields_into(channel, &mut fields)? {
        Ok(Decoded::Sample(Sample { fields }))
    } else {
        Ok(Decoded::EndOfStream)
    }
}

/// Decode one frame straight into its typed layout.
pub fn read_frame<L: FrameLayout, C: ByteChannel + ?Sized>(
    channel: &mut C,
) -> Result<Decoded<L>, ChannelError> {
    let mut fields = vec![0u16; L::FIELD_COUNT];
    if read_fields_into(channel, &mut fields)? {
        Ok(Decoded::Sample(L::from_fields(&fields)))
    } else {
        Ok(Decoded::EndOfStream)
    }
}
