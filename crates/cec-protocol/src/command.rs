//! CEC commands and their frame encoding
//!
//! Frame format:
//! ```text
//! [header] [opcode] [operand]...
//!
//! header:   (initiator << 4) | destination
//! opcode:   absent for a poll
//! operands: 0 to 14 bytes
//! ```

use std::fmt;
use std::time::Duration;

use crate::address::{LogicalAddress, PhysicalAddress};
use crate::error::ParseError;
use crate::opcode::Opcode;

/// Maximum number of operand bytes in one frame
pub const MAX_PARAMETERS: usize = 14;

/// Transmit timeout applied when none is configured
pub const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// A single CEC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CecCommand {
    /// Sender
    pub initiator: LogicalAddress,
    /// Receiver, or broadcast
    pub destination: LogicalAddress,
    /// Opcode, `None` for a poll
    pub opcode: Option<Opcode>,
    /// Operand bytes following the opcode
    pub parameters: Vec<u8>,
    /// Upper bound on the wait for a correlated response
    pub transmit_timeout: Duration,
}

impl CecCommand {
    /// Create a command without operands
    pub fn new(initiator: LogicalAddress, destination: LogicalAddress, opcode: Opcode) -> Self {
        Self {
            initiator,
            destination,
            opcode: Some(opcode),
            parameters: Vec::new(),
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
        }
    }

    /// Create a poll (header only)
    pub fn poll(initiator: LogicalAddress, destination: LogicalAddress) -> Self {
        Self {
            initiator,
            destination,
            opcode: None,
            parameters: Vec::new(),
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
        }
    }

    /// Builder: append one operand byte
    pub fn with_u8(mut self, value: u8) -> Self {
        self.parameters.push(value);
        self
    }

    /// Builder: append operand bytes
    pub fn with_bytes(mut self, bytes: &[u8]) -> Self {
        self.parameters.extend_from_slice(bytes);
        self
    }

    /// Builder: append a physical address
    pub fn with_physical_address(self, address: PhysicalAddress) -> Self {
        self.with_bytes(&address.to_bytes())
    }

    /// Whether the frame carries an opcode (false for a poll)
    pub fn opcode_set(&self) -> bool {
        self.opcode.is_some()
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }

    /// Header byte: initiator in the high nibble, destination in the low
    pub fn header_byte(&self) -> u8 {
        ((self.initiator.as_u8() & 0x0F) << 4) | (self.destination.as_u8() & 0x0F)
    }

    /// Physical address stored at `offset` in the operands
    pub fn physical_address_at(&self, offset: usize) -> Option<PhysicalAddress> {
        let bytes = self.parameters.get(offset..offset + 2)?;
        Some(PhysicalAddress::from_bytes([bytes[0], bytes[1]]))
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        if self.parameters.len() > MAX_PARAMETERS {
            return Err(ParseError::TooManyParameters(self.parameters.len()));
        }
        if self.opcode.is_none() && !self.parameters.is_empty() {
            return Err(ParseError::InvalidFrame(
                "poll frames carry no operands".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(2 + self.parameters.len());
        out.push(self.header_byte());
        if let Some(opcode) = self.opcode {
            out.push(opcode.as_u8());
            out.extend_from_slice(&self.parameters);
        }
        Ok(out)
    }

    /// Decode wire bytes
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let (&header, rest) = data
            .split_first()
            .ok_or(ParseError::Incomplete { needed: 1 })?;
        let initiator = LogicalAddress::from_nibble(header >> 4);
        let destination = LogicalAddress::from_nibble(header);

        let Some((&opcode_byte, parameters)) = rest.split_first() else {
            return Ok(Self::poll(initiator, destination));
        };
        if initiator.is_broadcast() {
            // 15 is only valid as an initiator for unregistered devices;
            // those may poll but never send opcodes to a specific address
            if !destination.is_broadcast() {
                return Err(ParseError::InvalidAddress(header));
            }
        }
        if parameters.len() > MAX_PARAMETERS {
            return Err(ParseError::TooManyParameters(parameters.len()));
        }
        Ok(Self {
            initiator,
            destination,
            // Unlisted opcodes are kept so the receiver can feature-abort them
            opcode: Some(Opcode::from_u8(opcode_byte)),
            parameters: parameters.to_vec(),
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
        })
    }
}

impl fmt::Display for CecCommand {
    /// `ii:oo:pp:..` in hex, like a bus monitor shows it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.header_byte())?;
        if let Some(opcode) = self.opcode {
            write!(f, ":{:02x}", opcode.as_u8())?;
            for byte in &self.parameters {
                write!(f, ":{:02x}", byte)?;
            }
        }
        Ok(())
    }
}
