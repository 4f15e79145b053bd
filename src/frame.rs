//! Framed response parsing for the polled receive stream
//!
//! Raw reads (`rxdata.bin`) return the payload followed by a sentinel byte
//! (`'@'`) and the new absolute stream position as ASCII decimal digits:
//!
//! ```text
//! payload bytes ... '@' '1' '2' '3' '4'
//! ```
//!
//! The payload may itself contain sentinel bytes; only the *last* occurrence
//! terminates the frame, so decoding scans backward from the end of the
//! buffer. Count queries (`rxcnt.bin`) invert the layout: the decimal count
//! comes before the sentinel, the position after it.
//!
//! How payload bytes are interpreted above this layer depends on the
//! device's configured framing [`Protocol`]; that string is device
//! configuration and is parsed here, never re-derived from traffic.

use bytes::Bytes;

use crate::constants::FRAME_SENTINEL;
use crate::error::{SerialError, SerialResult};

/// A decoded raw-read reply: payload plus the position to resume from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedResponse {
    /// The data portion of the frame.
    pub payload: Bytes,
    /// Device-reported absolute position for the next read.
    ///
    /// Must be adopted verbatim; it can exceed the previous position plus
    /// the payload length when the device buffer wrapped.
    pub new_position: u64,
}

/// Locate the trailing `sentinel + digits` suffix.
///
/// Returns the sentinel index and the decoded position. The scan runs from
/// the end so sentinel bytes inside the payload are skipped over.
fn split_suffix(raw: &[u8]) -> SerialResult<(usize, u64)> {
    if raw.is_empty() {
        return Err(SerialError::protocol("empty frame"));
    }
    let mut idx = raw.len() - 1;
    let mut position: u64 = 0;
    let mut mult: u64 = 1;
    while raw[idx] != FRAME_SENTINEL {
        let digit = raw[idx];
        if !digit.is_ascii_digit() {
            return Err(SerialError::protocol(format!(
                "non-decimal byte {:#04x} in position suffix",
                digit
            )));
        }
        position = position.saturating_add(mult.saturating_mul(u64::from(digit - b'0')));
        mult = mult.saturating_mul(10);
        if idx == 0 {
            return Err(SerialError::protocol("framing sentinel not found"));
        }
        idx -= 1;
    }
    Ok((idx, position))
}

/// Parse a `rxdata.bin` reply into payload and new position.
pub fn parse_framed(raw: &[u8]) -> SerialResult<FramedResponse> {
    let (sentinel, new_position) = split_suffix(raw)?;
    Ok(FramedResponse {
        payload: Bytes::copy_from_slice(&raw[..sentinel]),
        new_position,
    })
}

/// Parse a `rxcnt.bin` reply into the number of buffered bytes.
///
/// The count is the ASCII-decimal prefix before the sentinel.
pub fn parse_avail(raw: &[u8]) -> SerialResult<u64> {
    let (sentinel, _position) = split_suffix(raw)?;
    let text = std::str::from_utf8(&raw[..sentinel])
        .map_err(|_| SerialError::protocol("non-ASCII byte count"))?;
    text.parse::<u64>()
        .map_err(|_| SerialError::protocol(format!("invalid byte count {:?}", text)))
}

/// Framing policy configured on the device.
///
/// Selected by the device's protocol string; raw byte reads behave the same
/// under every policy, but message-oriented calls (`read_line`,
/// `read_messages`, `query_line`, the MODBUS family) only make sense for the
/// policies that define message boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Opaque byte stream, no segmentation.
    Byte,
    /// Printable character stream, no segmentation.
    Char,
    /// Messages are delimited by line terminators on the device side.
    Line,
    /// Message boundaries discovered by inter-byte timing, in milliseconds.
    Frame(u16),
    /// MODBUS ASCII framing; exchanges use the message-matching path.
    ModbusAscii,
    /// MODBUS RTU framing; exchanges use the message-matching path.
    ModbusRtu,
}

impl Protocol {
    /// Parse the device's protocol configuration string.
    ///
    /// Accepted forms: `"Byte"`, `"Char"`, `"Line"`, `"Frame:25ms"`,
    /// `"Modbus-ASCII"`, `"Modbus-RTU"`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Byte" => Some(Self::Byte),
            "Char" => Some(Self::Char),
            "Line" => Some(Self::Line),
            "Modbus-ASCII" => Some(Self::ModbusAscii),
            "Modbus-RTU" => Some(Self::ModbusRtu),
            _ => {
                let rest = s.strip_prefix("Frame:")?;
                let ms = rest.strip_suffix("ms")?;
                ms.parse::<u16>().ok().map(Self::Frame)
            }
        }
    }

    /// True when the device segments the stream into discrete messages.
    pub fn is_message_oriented(&self) -> bool {
        !matches!(self, Self::Byte | Self::Char)
    }

    /// True for the MODBUS framing policies.
    pub fn is_modbus(&self) -> bool {
        matches!(self, Self::ModbusAscii | Self::ModbusRtu)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Byte => write!(f, "Byte"),
            Self::Char => write!(f, "Char"),
            Self::Line => write!(f, "Line"),
            Self::Frame(ms) => write!(f, "Frame:{}ms", ms),
            Self::ModbusAscii => write!(f, "Modbus-ASCII"),
            Self::ModbusRtu => write!(f, "Modbus-RTU"),
        }
    }
}
