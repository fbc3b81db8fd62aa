//! Events emitted by the CEC actor

use cec_protocol::{CecCommand, LogicalAddress};

#[derive(Debug, Clone)]
pub enum CecEvent {
    /// A received command went through the dispatcher
    CommandHandled {
        command: CecCommand,
        /// False when it was rejected with an abort reason
        handled: bool,
    },

    /// Raw bytes that did not decode to a command
    FrameRejected { frame: Vec<u8>, error: String },

    /// A local device finished becoming the active source
    ActiveSourceActivated { address: LogicalAddress },
}
