//! Protocol constants for the polled serial transport and its MODBUS layer
//!
//! The framing values come from the hub's wire format (sentinel-terminated
//! position suffixes, 16-bit read windows); the MODBUS values come from the
//! official specification (253-byte PDU inherited from the RS485 ADU limit).

// ============================================================================
// Stream framing
// ============================================================================

/// Sentinel byte terminating the payload of a framed response (`'@'`).
///
/// Everything after the last occurrence of this byte in a raw reply is the
/// new absolute stream position, as ASCII decimal digits.
pub const FRAME_SENTINEL: u8 = 0x40;

/// Maximum byte count for a single read request.
///
/// The `len` query parameter is a 16-bit field on the device; larger caller
/// requests are clamped here, never rejected.
pub const MAX_READ_LEN: usize = 65535;

// ============================================================================
// MODBUS line envelope
// ============================================================================

/// Length of the line envelope preceding the hex PDU in a MODBUS reply.
///
/// Replies arrive as `:` + two slave-address hex digits + PDU hex; the
/// decoder strips these three characters before hex-decoding.
pub const REPLY_ENVELOPE_LEN: usize = 3;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// This is the fundamental limit inherited from RS485 implementation:
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Read/Write Multiple Registers (FC23)
pub const FC_READ_WRITE_REGISTERS: u8 = 0x17;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_at_sign() {
        assert_eq!(FRAME_SENTINEL, b'@');
    }

    #[test]
    fn test_read_len_fits_query_field() {
        assert_eq!(MAX_READ_LEN, u16::MAX as usize);
    }

    #[test]
    fn test_function_codes() {
        assert_eq!(FC_WRITE_MULTIPLE_COILS, 15);
        assert_eq!(FC_WRITE_MULTIPLE_REGISTERS, 16);
        assert_eq!(FC_READ_WRITE_REGISTERS, 23);
    }
}
