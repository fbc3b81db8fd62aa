//! CEC Protocol Library
//!
//! Wire-level types for the HDMI Consumer Electronics Control bus:
//!
//! - **Addresses**: 4-bit logical addresses, 16-bit physical addresses and 24-bit vendor ids
//! - **Opcodes**: the operations this implementation understands
//! - **Operands**: abort reasons, power/menu/deck states, audio status and short audio descriptors
//! - **Commands**: a header, an optional opcode and up to 14 operand bytes
//!
//! # Architecture
//!
//! This crate performs no I/O. A received frame is decoded into a
//! [`CecCommand`]; the device logic in `cec-core` decides what to do with it
//! and builds outgoing commands, which are encoded back to bytes for the
//! adapter. [`ResponseTable`] tells a transmitter which opcode answers a
//! request so it can wait for it.
//!
//! # Example
//!
//! ```rust
//! use cec_protocol::{CecCommand, LogicalAddress, Opcode, ResponseTable};
//!
//! // A TV asking the audio system for its volume
//! let cmd = CecCommand::decode(&[0x05, 0x71]).unwrap();
//! assert_eq!(cmd.initiator, LogicalAddress::Tv);
//! assert_eq!(cmd.opcode, Some(Opcode::GiveAudioStatus));
//!
//! let expected = ResponseTable::General.expected_response(Opcode::GiveAudioStatus);
//! assert_eq!(expected, Some(Opcode::ReportAudioStatus));
//! ```

pub mod address;
pub mod command;
pub mod error;
mod macros;
pub mod opcode;
pub mod operand;
pub mod response;

pub use address::{LogicalAddress, LogicalAddresses, PhysicalAddress, VendorId};
pub use command::{CecCommand, DEFAULT_TRANSMIT_TIMEOUT, MAX_PARAMETERS};
pub use error::ParseError;
pub use opcode::Opcode;
pub use operand::{
    AbortReason, ArcStatus, AudioStatus, CecVersion, DeckControlMode, DeckInfo, DeviceType,
    MenuRequestType, MenuState, PowerStatus, ShortAudioDescriptor, SystemAudioStatus,
    UserControlCode,
};
pub use response::ResponseTable;
