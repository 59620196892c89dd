//! Error types for the lower transport engine.

use std::fmt;

/// Result type for lower transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors surfaced to the caller.
///
/// Only outbound operations and configuration ever fail with an error.
/// Inbound wire garbage is dropped silently and counted — a lossy
/// packet-radio link is the normal operating mode, not a failure.
#[derive(Debug)]
pub enum TransportError {
    /// Reserved bits set incorrectly, or a truncated PDU.
    Malformed { message: String },
    /// Outbound payload exceeds the limit for its message class.
    PayloadTooLarge { len: usize, max: usize },
    /// Outbound control opcode is reserved or out of range.
    InvalidOpcode { opcode: u8 },
    /// Configuration rejected by `validate()`.
    Config { message: String },
}

impl TransportError {
    /// Create a malformed-PDU error.
    pub fn malformed(message: impl Into<String>) -> Self {
        TransportError::Malformed {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        TransportError::Config {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Malformed { message } => write!(f, "Malformed PDU: {message}"),
            TransportError::PayloadTooLarge { len, max } => {
                write!(f, "Payload too large: {len} bytes (maximum {max})")
            }
            TransportError::InvalidOpcode { opcode } => {
                write!(f, "Invalid control opcode: 0x{opcode:02X}")
            }
            TransportError::Config { message } => write!(f, "Configuration error: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}
