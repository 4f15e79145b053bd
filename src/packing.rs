//! Bit and register packing for MODBUS payload bodies
//!
//! Coil state travels 8 bits per byte, least-significant bit first within
//! each byte; register values travel as big-endian 16-bit words. These are
//! the only two packings the protocol uses, and every function-specific
//! encode/decode routine goes through them.

/// Pack a boolean vector into a byte-packed coil buffer.
///
/// Bit `i` lands at byte `i / 8`, bit position `i % 8`. Unused high bits of
/// the final byte are zero.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Unpack exactly `count` bits from a byte-packed coil buffer.
///
/// Padding bits in the last byte are discarded. Returns `None` when the
/// buffer is too short for `count` bits.
pub fn unpack_bits(bytes: &[u8], count: usize) -> Option<Vec<bool>> {
    if bytes.len() * 8 < count {
        return None;
    }
    let mut bits = Vec::with_capacity(count);
    for i in 0..count {
        bits.push(bytes[i / 8] & (1 << (i % 8)) != 0);
    }
    Some(bits)
}

/// Serialize register values as big-endian 16-bit words.
pub fn pack_registers(registers: &[u16]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(registers.len() * 2);
    for &value in registers {
        packed.extend_from_slice(&value.to_be_bytes());
    }
    packed
}

/// Deserialize big-endian 16-bit words.
///
/// Returns `None` on an odd byte count; registers are always a whole number
/// of 2-byte units.
pub fn unpack_registers(bytes: &[u8]) -> Option<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect(),
    )
}
