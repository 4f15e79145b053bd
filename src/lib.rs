//! # Polled Serial - Stream Framing and MODBUS Master Engine
//!
//! Client-side driver for hardware serial I/O modules reached through a
//! shared, HTTP-polled transport. The hub exposes each port's receive
//! buffer as an append-only byte stream addressed by an absolute position
//! cursor; this crate turns that into a resumable stream abstraction with
//! short reads, message-boundary discovery and a full MODBUS master on top.
//!
//! ## Features
//!
//! - **Resumable stream reads**: absolute cursor, short reads, verbatim
//!   adoption of the device-reported position across buffer wraparound
//! - **Message matching**: pattern-constrained, timeout-bounded searches for
//!   complete messages; atomic command/reply line queries
//! - **MODBUS master**: PDU construction, reply validation, typed exception
//!   decoding, bit/register packing
//! - **Typed errors**: transport failure, timeout, malformed reply and the
//!   four standard MODBUS exception kinds are all distinct variants
//!
//! ## Supported Function Codes
//!
//! | Code | Function |
//! |------|----------|
//! | 0x01 | Read Coils |
//! | 0x02 | Read Discrete Inputs |
//! | 0x03 | Read Holding Registers |
//! | 0x04 | Read Input Registers |
//! | 0x05 | Write Single Coil |
//! | 0x06 | Write Single Register |
//! | 0x0F | Write Multiple Coils |
//! | 0x10 | Write Multiple Registers |
//! | 0x17 | Read/Write Multiple Registers |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polled_serial::{PolledTransport, SerialPort, SerialResult};
//!
//! async fn run<T: PolledTransport>(transport: T) -> SerialResult<()> {
//!     let mut port = SerialPort::new(transport);
//!
//!     // Read holding registers from slave 1
//!     let values = port.modbus_read_registers(1, 0, 10).await?;
//!     println!("Read registers: {:?}", values);
//!
//!     // Write single register
//!     port.modbus_write_register(1, 100, 0x1234).await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Protocol constants for framing and MODBUS
pub mod constants;

/// Absolute stream position tracking
pub mod cursor;

/// Sentinel-framed response parsing and framing protocol selection
pub mod frame;

/// Glob-style message patterns and the MODBUS reply-pattern derivation
pub mod pattern;

/// Bit and register packing for MODBUS payload bodies
pub mod packing;

/// High-performance PDU with stack-allocated fixed array
pub mod pdu;

/// MODBUS command serialization and reply decoding
pub mod codec;

/// Transport collaborator contract
pub mod transport;

/// Exchange logging
pub mod logging;

/// The serial port driver object
pub mod port;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use polled_serial::tokio) ===
pub use tokio;

// === Core driver API ===
pub use port::SerialPort;

// === Error handling ===
pub use error::{ModbusException, SerialError, SerialResult};

// === Core types ===
pub use cursor::StreamCursor;
pub use frame::{FramedResponse, Protocol};
pub use pattern::MessagePattern;

// === MODBUS building blocks (advanced usage) ===
pub use codec::ModbusCodec;
pub use pdu::{ModbusPdu, PduBuilder};

// === Transport ===
pub use transport::{PolledTransport, TransportStats};

// === Logging ===
pub use logging::{CallbackLogger, LogCallback, LogLevel};

// === Protocol limits (commonly needed constants) ===
pub use constants::{FRAME_SENTINEL, MAX_PDU_SIZE, MAX_READ_LEN};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Polled Serial v{} - stream framing and MODBUS master engine for polled serial hubs",
        VERSION
    )
}
