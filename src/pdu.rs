//! MODBUS PDU construction
//!
//! A PDU is the function code plus its parameters, exclusive of slave
//! addressing. The buffer is a fixed-size stack array; nothing in the
//! protocol can exceed 253 bytes, so no heap allocation is needed.
//!
//! All 16-bit fields (addresses, counts, values) are serialized big-endian.
//! Byte-count fields are always derived here, never caller-supplied:
//! `ceil(bits / 8)` for coil payloads, `2 × count` for register payloads.

use tracing::debug;

use crate::constants::{
    FC_READ_WRITE_REGISTERS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE,
};
use crate::error::{SerialError, SerialResult};
use crate::packing;

/// A MODBUS Protocol Data Unit in a fixed stack buffer.
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from raw bytes.
    #[inline]
    pub fn from_slice(data: &[u8]) -> SerialResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(SerialError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Append a single byte.
    #[inline]
    pub fn push(&mut self, byte: u8) -> SerialResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(SerialError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a 16-bit value, high byte first.
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> SerialResult<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// Append a byte slice.
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> SerialResult<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(SerialError::protocol(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// The encoded bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Encoded length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes have been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The function code, i.e. the first byte.
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// True when the function code carries the exception bit.
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code().is_some_and(|fc| fc & 0x80 != 0)
    }

    /// The exception code byte of an exception response.
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.as_slice().get(1).copied()
        } else {
            None
        }
    }

    /// Human-readable name for a function code.
    pub fn function_name(fc: u8) -> &'static str {
        match fc & 0x7F {
            0x01 => "Read Coils",
            0x02 => "Read Discrete Inputs",
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            0x05 => "Write Single Coil",
            0x06 => "Write Single Register",
            0x0F => "Write Multiple Coils",
            0x10 => "Write Multiple Registers",
            0x17 => "Read/Write Multiple Registers",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent PDU builder.
///
/// The static constructors below build the request shapes this driver
/// issues; they are the single source of truth for field order and derived
/// byte counts.
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    /// Start an empty builder.
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Set the function code (must be the first byte).
    #[inline]
    pub fn function_code(mut self, fc: u8) -> SerialResult<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Append a 16-bit address field.
    #[inline]
    pub fn address(mut self, addr: u16) -> SerialResult<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    /// Append a 16-bit quantity or value field.
    #[inline]
    pub fn quantity(mut self, qty: u16) -> SerialResult<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    /// Append one raw byte.
    #[inline]
    pub fn byte(mut self, b: u8) -> SerialResult<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    /// Append raw payload bytes.
    #[inline]
    pub fn data(mut self, data: &[u8]) -> SerialResult<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    /// Finish and return the PDU.
    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            debug!(
                "PDU built: FC={:02X} ({}), len={}",
                fc,
                ModbusPdu::function_name(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    /// Build a read request (FC 0x01-0x04): start address + count.
    pub fn read_request(fc: u8, start: u16, count: u16) -> SerialResult<ModbusPdu> {
        if !matches!(fc, 0x01..=0x04) {
            return Err(SerialError::invalid_data(format!(
                "not a read function code: {:#04x}",
                fc
            )));
        }
        Ok(PduBuilder::new()
            .function_code(fc)?
            .address(start)?
            .quantity(count)?
            .build())
    }

    /// Build a Write Single Coil request (FC 0x05).
    ///
    /// The value field is 0xFF00 for ON and 0x0000 for OFF; no other
    /// encodings exist.
    pub fn write_single_coil(addr: u16, value: bool) -> SerialResult<ModbusPdu> {
        let field: u16 = if value { 0xFF00 } else { 0x0000 };
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_COIL)?
            .address(addr)?
            .quantity(field)?
            .build())
    }

    /// Build a Write Single Register request (FC 0x06).
    pub fn write_single_register(addr: u16, value: u16) -> SerialResult<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)?
            .address(addr)?
            .quantity(value)?
            .build())
    }

    /// Build a Write Multiple Coils request (FC 0x0F).
    pub fn write_multiple_coils(start: u16, bits: &[bool]) -> SerialResult<ModbusPdu> {
        if bits.is_empty() || bits.len() > u16::MAX as usize {
            return Err(SerialError::invalid_data("invalid coil count"));
        }
        let packed = packing::pack_bits(bits);
        PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_COILS)?
            .address(start)?
            .quantity(bits.len() as u16)?
            .byte(packed.len() as u8)?
            .data(&packed)
            .map(PduBuilder::build)
    }

    /// Build a Write Multiple Registers request (FC 0x10).
    pub fn write_multiple_registers(start: u16, values: &[u16]) -> SerialResult<ModbusPdu> {
        if values.is_empty() || values.len() > u16::MAX as usize {
            return Err(SerialError::invalid_data("invalid register count"));
        }
        let packed = packing::pack_registers(values);
        PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
            .address(start)?
            .quantity(values.len() as u16)?
            .byte(packed.len() as u8)?
            .data(&packed)
            .map(PduBuilder::build)
    }

    /// Build a Read/Write Multiple Registers request (FC 0x17).
    ///
    /// Field order is read start, read count, write start, write count,
    /// derived byte count, then the write values.
    pub fn read_write_registers(
        read_start: u16,
        read_count: u16,
        write_start: u16,
        values: &[u16],
    ) -> SerialResult<ModbusPdu> {
        if values.is_empty() || values.len() > u16::MAX as usize {
            return Err(SerialError::invalid_data("invalid register count"));
        }
        let packed = packing::pack_registers(values);
        PduBuilder::new()
            .function_code(FC_READ_WRITE_REGISTERS)?
            .address(read_start)?
            .quantity(read_count)?
            .address(write_start)?
            .quantity(values.len() as u16)?
            .byte(packed.len() as u8)?
            .data(&packed)
            .map(PduBuilder::build)
    }
}
