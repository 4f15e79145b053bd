//! Error types for the polled serial driver
//!
//! Every fallible operation returns [`SerialResult`]. The taxonomy separates
//! the cases a caller handles differently:
//!
//! - [`SerialError::Transport`]: the underlying request could not be made
//! - [`SerialError::NoReply`]: the bounded wait elapsed with no matching
//!   message; the exchange may simply be retried
//! - [`SerialError::Protocol`]: a reply arrived but could not be decoded;
//!   the stream position may be ambiguous, so callers should consider a
//!   `read_seek` before continuing
//! - [`SerialError::Exception`]: the slave answered with a MODBUS exception
//!   response; always recoverable at the caller's discretion
//!
//! Nothing is retried internally; recovery policy belongs to the caller.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type SerialResult<T> = Result<T, SerialError>;

/// MODBUS exception categories reported by a slave device.
///
/// The four standard codes get their own variants; any other reported code is
/// preserved in [`ModbusException::Other`] rather than being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusException {
    /// Code 1: the function code is not supported by the slave.
    IllegalFunction,
    /// Code 2: the data address is not valid for the slave.
    IllegalDataAddress,
    /// Code 3: a value in the request is not acceptable.
    IllegalDataValue,
    /// Code 4: the slave failed while executing the request.
    SlaveDeviceFailure,
    /// Any other device-reported exception code.
    Other(u8),
}

impl ModbusException {
    /// Classify a raw exception code byte.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::SlaveDeviceFailure,
            other => Self::Other(other),
        }
    }

    /// The raw exception code byte.
    pub fn code(&self) -> u8 {
        match self {
            Self::IllegalFunction => 1,
            Self::IllegalDataAddress => 2,
            Self::IllegalDataValue => 3,
            Self::SlaveDeviceFailure => 4,
            Self::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for ModbusException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function"),
            Self::IllegalDataAddress => write!(f, "illegal data address"),
            Self::IllegalDataValue => write!(f, "illegal data value"),
            Self::SlaveDeviceFailure => write!(f, "slave device failure"),
            Self::Other(code) => write!(f, "device-reported failure (code {:#04x})", code),
        }
    }
}

/// Error type for all driver operations.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The transport request itself failed.
    #[error("Transport error: {message}")]
    Transport {
        /// Error description
        message: String,
    },

    /// No matching reply arrived within the wait bound.
    #[error("No reply from slave")]
    NoReply,

    /// A reply arrived but violated the wire format.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error description
        message: String,
    },

    /// The slave answered with a MODBUS exception response.
    #[error("MODBUS exception for function {function:#04x}: {exception}")]
    Exception {
        /// The function code of the request that was rejected
        function: u8,
        /// The classified exception
        exception: ModbusException,
    },

    /// A caller-supplied argument was out of range or inconsistent.
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Error description
        message: String,
    },

    /// The operation needs a device channel this driver does not provide.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// Error description
        message: String,
    },

    /// Bad driver configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error description
        message: String,
    },
}

impl SerialError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid-data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an exception error from a raw exception code byte.
    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception {
            function,
            exception: ModbusException::from_code(code),
        }
    }

    /// True for errors a caller can retry without resynchronizing the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoReply | Self::Exception { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_classification() {
        assert_eq!(
            ModbusException::from_code(1),
            ModbusException::IllegalFunction
        );
        assert_eq!(
            ModbusException::from_code(2),
            ModbusException::IllegalDataAddress
        );
        assert_eq!(
            ModbusException::from_code(3),
            ModbusException::IllegalDataValue
        );
        assert_eq!(
            ModbusException::from_code(4),
            ModbusException::SlaveDeviceFailure
        );
        assert_eq!(ModbusException::from_code(11), ModbusException::Other(11));
    }

    #[test]
    fn test_exception_code_roundtrip() {
        for code in 0..=255u8 {
            assert_eq!(ModbusException::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_recoverable() {
        assert!(SerialError::NoReply.is_recoverable());
        assert!(SerialError::exception(0x03, 2).is_recoverable());
        assert!(!SerialError::protocol("bad frame").is_recoverable());
        assert!(!SerialError::transport("down").is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = SerialError::exception(0x03, 2);
        let text = err.to_string();
        assert!(text.contains("0x03"));
        assert!(text.contains("illegal data address"));
    }
}
