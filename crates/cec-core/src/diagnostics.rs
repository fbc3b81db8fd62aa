//! Log of commands the dispatcher could not interpret
//!
//! Entries are keyed by opcode. A command is only kept when no earlier entry
//! for the same opcode carried identical parameters, so repeated traffic
//! does not grow the log.

use std::collections::BTreeMap;

use cec_protocol::{CecCommand, Opcode};
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct UnmappedCommandLog {
    entries: BTreeMap<u8, Vec<CecCommand>>,
}

impl UnmappedCommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `command`; returns false for a duplicate or a poll
    pub fn record(&mut self, command: &CecCommand) -> bool {
        let Some(opcode) = command.opcode else {
            return false;
        };
        let seen = self.entries.entry(opcode.as_u8()).or_default();
        if seen
            .iter()
            .any(|previous| previous.parameters == command.parameters)
        {
            return false;
        }
        warn!(
            "unmapped command '{}' with parameters {:02x?}, please report: {}",
            opcode, command.parameters, command
        );
        seen.push(command.clone());
        true
    }

    /// Total number of recorded commands
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    pub fn commands(&self, opcode: Opcode) -> &[CecCommand] {
        self.entries
            .get(&opcode.as_u8())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
