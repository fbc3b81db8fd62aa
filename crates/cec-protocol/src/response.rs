//! Response correlation tables
//!
//! When a request is transmitted, the sender can block until the destination
//! answers with the correlated opcode. Three tables exist, one per transmit
//! variant.

use crate::opcode::Opcode;

/// Which correlation table a transmission uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseTable {
    /// Request/report pairs
    #[default]
    General,
    /// Expects the destination to feature-abort the opcode
    FeatureAbort,
    /// Standby, which expects a feature abort echo of itself
    Standby,
}

impl ResponseTable {
    /// Opcode that correlates with an outgoing `opcode`, if any
    pub fn expected_response(self, opcode: Opcode) -> Option<Opcode> {
        match self {
            ResponseTable::General => general_response(opcode),
            // Incoming feature aborts are signalled with the opcode they reject
            ResponseTable::FeatureAbort => match opcode {
                Opcode::FeatureAbort | Opcode::Abort => None,
                other => Some(other),
            },
            ResponseTable::Standby => match opcode {
                Opcode::Standby => Some(Opcode::Standby),
                _ => None,
            },
        }
    }

    /// Whether a known-unsupported destination short-circuits the send
    pub fn honours_unsupported(self) -> bool {
        self == ResponseTable::General
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseTable::General => "general",
            ResponseTable::FeatureAbort => "feature abort",
            ResponseTable::Standby => "standby",
        }
    }
}

fn general_response(opcode: Opcode) -> Option<Opcode> {
    let response = match opcode {
        Opcode::GiveDevicePowerStatus => Opcode::ReportPowerStatus,
        Opcode::GivePhysicalAddress => Opcode::ReportPhysicalAddress,
        Opcode::GiveDeviceVendorId => Opcode::DeviceVendorId,
        Opcode::GetCecVersion => Opcode::CecVersion,
        Opcode::GiveOsdName => Opcode::SetOsdName,
        Opcode::GetMenuLanguage => Opcode::SetMenuLanguage,
        Opcode::GiveAudioStatus => Opcode::ReportAudioStatus,
        Opcode::GiveSystemAudioModeStatus => Opcode::SystemAudioModeStatus,
        Opcode::SystemAudioModeRequest => Opcode::SetSystemAudioMode,
        Opcode::GiveDeckStatus => Opcode::DeckStatus,
        Opcode::GiveTunerDeviceStatus => Opcode::TunerDeviceStatus,
        Opcode::RequestActiveSource => Opcode::ActiveSource,
        Opcode::MenuRequest => Opcode::MenuStatus,
        Opcode::RequestArcStart => Opcode::StartArc,
        Opcode::RequestArcEnd => Opcode::EndArc,
        Opcode::StartArc => Opcode::ReportArcStarted,
        Opcode::EndArc => Opcode::ReportArcEnded,
        Opcode::RequestShortAudioDescriptor => Opcode::ReportShortAudioDescriptor,
        _ => return None,
    };
    Some(response)
}
