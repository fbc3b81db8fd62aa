//! Virtual device seam

use cec_protocol::{AbortReason, CecCommand, LogicalAddress, Opcode, PhysicalAddress};

/// A remote device attached to a [`VirtualBus`](crate::VirtualBus)
pub trait VirtualDevice: Send {
    fn logical_address(&self) -> LogicalAddress;

    fn physical_address(&self) -> PhysicalAddress;

    /// Handle a frame seen on the bus, returning the frames sent in reply
    ///
    /// Called for frames addressed to this device and for broadcasts from
    /// other devices.
    fn receive(&mut self, command: &CecCommand) -> Vec<CecCommand>;

    /// Every frame passed to [`receive`](Self::receive), in order
    fn received(&self) -> &[CecCommand];
}

/// Feature abort of `command` sent back to its initiator
pub fn feature_abort(command: &CecCommand, reason: AbortReason) -> CecCommand {
    let opcode = command.opcode.map(Opcode::as_u8).unwrap_or(0);
    CecCommand::new(command.destination, command.initiator, Opcode::FeatureAbort)
        .with_bytes(&[opcode, reason.as_u8()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_abort_swaps_addresses() {
        let request = CecCommand::new(
            LogicalAddress::Playback1,
            LogicalAddress::AudioSystem,
            Opcode::RequestShortAudioDescriptor,
        );
        let abort = feature_abort(&request, AbortReason::InvalidOperand);
        assert_eq!(abort.initiator, LogicalAddress::AudioSystem);
        assert_eq!(abort.destination, LogicalAddress::Playback1);
        assert_eq!(abort.parameters, vec![0xA4, 0x03]);
    }
}
