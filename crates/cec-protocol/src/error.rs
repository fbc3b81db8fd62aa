//! Error types for CEC frame parsing and operand decoding

use thiserror::Error;

/// Errors that can occur while parsing CEC data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid logical address
    #[error("invalid address: 0x{0:02X}")]
    InvalidAddress(u8),

    /// More operands than a CEC frame can carry
    #[error("too many parameters: {0} (max {max})", max = crate::command::MAX_PARAMETERS)]
    TooManyParameters(usize),

    /// Operand byte outside the range of an enumerated type
    #[error("invalid {kind} value: 0x{value:02X}")]
    InvalidValue { kind: &'static str, value: u8 },
}
