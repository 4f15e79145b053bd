//! MODBUS command serialization and reply decoding
//!
//! Commands travel to the hub as ASCII hex, two lowercase digits per byte,
//! slave address first. Replies come back as line-protocol messages carrying
//! a 3-character envelope (`:` plus the echoed slave address) ahead of the
//! hex PDU.
//!
//! The reply pattern handed to the matcher captures both the success echo
//! and the `function | 0x80` exception variant, so everything arriving here
//! still needs classification:
//!
//! - echoed code equals the request code: success, body handed to the
//!   function-specific decoder
//! - echoed code equals `request | 0x80`: the next byte is the exception
//!   code, classified into [`ModbusException`]
//! - anything else: protocol corruption, never silently ignored

use tracing::{debug, trace};

use crate::constants::REPLY_ENVELOPE_LEN;
use crate::error::{SerialError, SerialResult};
use crate::packing;
use crate::pdu::ModbusPdu;

/// Encode bytes as lowercase ASCII hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Decode ASCII hex (either case) into bytes.
pub fn decode_hex(text: &str) -> SerialResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(SerialError::protocol(format!(
            "odd-length hex string ({} chars)",
            text.len()
        )));
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        out.push(hi << 4 | lo);
    }
    Ok(out)
}

fn hex_digit(b: u8) -> SerialResult<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        other => Err(SerialError::protocol(format!(
            "invalid hex digit {:#04x}",
            other
        ))),
    }
}

/// Stateless encoder/decoder for MODBUS exchanges over the polled line.
pub struct ModbusCodec;

impl ModbusCodec {
    /// Serialize a request as the hex command string: slave address then PDU.
    pub fn command_string(slave: u8, pdu: &ModbusPdu) -> String {
        let mut cmd = format!("{:02x}", slave);
        cmd.push_str(&encode_hex(pdu.as_slice()));
        trace!("MODBUS command: {}", cmd);
        cmd
    }

    /// Decode a reply message into raw PDU bytes, validating the echo.
    ///
    /// `text` is the matched message including its 3-character envelope.
    /// On success the returned vector is the full reply PDU, function code
    /// first.
    pub fn decode_reply(text: &str, function: u8) -> SerialResult<Vec<u8>> {
        if !text.is_ascii() || text.len() < REPLY_ENVELOPE_LEN {
            return Err(SerialError::protocol(format!(
                "reply is not a hex message: {:?}",
                text
            )));
        }
        let reply = decode_hex(&text[REPLY_ENVELOPE_LEN..])?;
        let Some(&echoed) = reply.first() else {
            return Err(SerialError::protocol("empty reply PDU"));
        };
        if echoed == function {
            debug!(
                "MODBUS reply: FC={:02X} ({}), {} bytes",
                echoed,
                ModbusPdu::function_name(echoed),
                reply.len()
            );
            return Ok(reply);
        }
        if echoed == function | 0x80 {
            let Some(&code) = reply.get(1) else {
                return Err(SerialError::protocol("truncated exception reply"));
            };
            debug!(
                "MODBUS exception: FC={:02X}, code={:02X}",
                function, code
            );
            return Err(SerialError::exception(function, code));
        }
        Err(SerialError::protocol(format!(
            "function code echo mismatch: sent {:#04x}, got {:#04x}",
            function, echoed
        )))
    }

    /// Decode a read-bits reply body (FC 0x01/0x02) into `count` booleans.
    pub fn decode_read_bits(reply: &[u8], count: usize) -> SerialResult<Vec<bool>> {
        let body = Self::counted_body(reply)?;
        if body.len() < count.div_ceil(8) {
            return Err(SerialError::protocol(format!(
                "bit reply too short: {} bytes for {} bits",
                body.len(),
                count
            )));
        }
        packing::unpack_bits(body, count)
            .ok_or_else(|| SerialError::protocol("bit reply shorter than declared"))
    }

    /// Decode a read-registers reply body (FC 0x03/0x04/0x17).
    pub fn decode_read_registers(reply: &[u8], count: usize) -> SerialResult<Vec<u16>> {
        let body = Self::counted_body(reply)?;
        if body.len() < count * 2 {
            return Err(SerialError::protocol(format!(
                "register reply too short: {} bytes for {} registers",
                body.len(),
                count
            )));
        }
        packing::unpack_registers(&body[..count * 2])
            .ok_or_else(|| SerialError::protocol("odd register payload"))
    }

    /// Decode the affected-count field of a multiple-write reply
    /// (FC 0x0F/0x10): bytes 3-4, big-endian.
    pub fn decode_write_count(reply: &[u8]) -> SerialResult<u16> {
        if reply.len() < 5 {
            return Err(SerialError::protocol(format!(
                "write reply too short: {} bytes",
                reply.len()
            )));
        }
        Ok(u16::from_be_bytes([reply[3], reply[4]]))
    }

    /// Validate an echo-only write reply (FC 0x05/0x06).
    ///
    /// These replies simply echo the request; the affected count is always 1.
    pub fn decode_write_echo(reply: &[u8]) -> SerialResult<u16> {
        if reply.len() < 5 {
            return Err(SerialError::protocol(format!(
                "write echo too short: {} bytes",
                reply.len()
            )));
        }
        Ok(1)
    }

    /// Split off a declared-byte-count body and validate its consistency.
    fn counted_body(reply: &[u8]) -> SerialResult<&[u8]> {
        if reply.len() < 2 {
            return Err(SerialError::protocol("reply missing byte count"));
        }
        let declared = reply[1] as usize;
        let body = &reply[2..];
        if body.len() < declared {
            return Err(SerialError::protocol(format!(
                "reply declares {} body bytes but carries {}",
                declared,
                body.len()
            )));
        }
        Ok(&body[..declared])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusException;
    use crate::pdu::PduBuilder;

    #[test]
    fn test_hex_roundtrip() {
        let bytes = [0x00, 0x2A, 0xFF, 0x10];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "002aff10");
        assert_eq!(decode_hex(&hex).unwrap(), bytes);
        assert_eq!(decode_hex("002AFF10").unwrap(), bytes);
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(decode_hex("0").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_command_string() {
        let pdu = PduBuilder::read_request(0x03, 0, 2).unwrap();
        assert_eq!(ModbusCodec::command_string(1, &pdu), "010300000002");
    }

    #[test]
    fn test_decode_reply_success() {
        // Slave 1 echoes FC 03, byte count 4, registers 42 and 16.
        let reply = ModbusCodec::decode_reply(":010304002a0010", 0x03).unwrap();
        assert_eq!(reply, vec![0x03, 0x04, 0x00, 0x2A, 0x00, 0x10]);
        let regs = ModbusCodec::decode_read_registers(&reply, 2).unwrap();
        assert_eq!(regs, vec![42, 16]);
    }

    #[test]
    fn test_decode_reply_exception() {
        let err = ModbusCodec::decode_reply(":018302", 0x03).unwrap_err();
        match err {
            SerialError::Exception {
                function,
                exception,
            } => {
                assert_eq!(function, 0x03);
                assert_eq!(exception, ModbusException::IllegalDataAddress);
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_reply_unknown_exception_code() {
        // Codes beyond 4 are still surfaced, never dropped.
        let err = ModbusCodec::decode_reply(":01830b", 0x03).unwrap_err();
        match err {
            SerialError::Exception { exception, .. } => {
                assert_eq!(exception, ModbusException::Other(11));
            }
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_reply_echo_mismatch_is_corruption() {
        // An unrelated function code is not an exception reply.
        let err = ModbusCodec::decode_reply(":010402", 0x03).unwrap_err();
        assert!(matches!(err, SerialError::Protocol { .. }));
    }

    #[test]
    fn test_decode_reply_malformed() {
        assert!(ModbusCodec::decode_reply(":0", 0x03).is_err());
        assert!(ModbusCodec::decode_reply(":01030", 0x03).is_err());
        assert!(ModbusCodec::decode_reply(":01", 0x03).is_err());
    }

    #[test]
    fn test_decode_read_bits() {
        // FC 01, byte count 2, bits 0..10 all set.
        let reply = [0x01, 0x02, 0xFF, 0x03];
        let bits = ModbusCodec::decode_read_bits(&reply, 10).unwrap();
        assert_eq!(bits, vec![true; 10]);
    }

    #[test]
    fn test_decode_read_bits_inconsistent_count() {
        // Declares 2 body bytes but carries 1.
        let reply = [0x01, 0x02, 0xFF];
        assert!(ModbusCodec::decode_read_bits(&reply, 10).is_err());
    }

    #[test]
    fn test_decode_write_count() {
        // FC 0F echo: addr 0x0013, 10 coils written.
        let reply = [0x0F, 0x00, 0x13, 0x00, 0x0A];
        assert_eq!(ModbusCodec::decode_write_count(&reply).unwrap(), 10);
        assert!(ModbusCodec::decode_write_count(&reply[..4]).is_err());
    }

    #[test]
    fn test_decode_write_echo() {
        let reply = [0x05, 0x00, 0x05, 0xFF, 0x00];
        assert_eq!(ModbusCodec::decode_write_echo(&reply).unwrap(), 1);
    }
}
