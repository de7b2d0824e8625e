//! Error types for the bootloader wire codec

use thiserror::Error;

/// Decode failures for bootloader frames
///
/// Any of these means the bytes on the wire do not follow the bootloader
/// protocol. They are never produced for well-formed but unexpected replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame was empty
    #[error("empty message")]
    Empty,

    /// The frame is shorter than the layout of its message type
    #[error("message 0x{opcode:02X} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Leading byte of the frame
        opcode: u8,
        /// Bytes required by the layout
        expected: usize,
        /// Bytes received
        actual: usize,
    },

    /// The leading byte is not a known response type
    #[error("unknown bootloader response type: 0x{0:02X}")]
    UnknownResponse(u8),

    /// The leading byte is not a known request opcode
    #[error("unknown bootloader command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Error frame without the error bytecode at its expected position
    #[error("expecting error bytecode 0x05 but got 0x{0:02X}")]
    BadErrorBytecode(u8),

    /// Error frame carrying an error code other than "unknown command"
    #[error("unknown error code: 0x{0:02X}")]
    UnknownErrorCode(u8),

    /// Program request with a length field that disagrees with the frame
    #[error("program request length field {field} does not match payload of {payload} bytes")]
    LengthMismatch {
        /// Value of the length byte
        field: u8,
        /// Actual number of payload bytes
        payload: usize,
    },
}

/// Result type for codec operations
pub type Result<T> = core::result::Result<T, ProtocolError>;
