//! Virtual TV
//!
//! Answers the queries a source device sends to the TV and tracks the state
//! those sources change: power, the active source and the return channel.

use cec_protocol::{
    AbortReason, CecCommand, CecVersion, DeviceType, LogicalAddress, Opcode, PhysicalAddress,
    PowerStatus, SystemAudioStatus, VendorId,
};
use tracing::debug;

use crate::device::{feature_abort, VirtualDevice};

/// A simulated TV at logical address 0, physical address 0.0.0.0
#[derive(Debug)]
pub struct VirtualTv {
    osd_name: String,
    vendor_id: VendorId,
    power: PowerStatus,
    active_source: Option<PhysicalAddress>,
    arc_active: bool,
    system_audio: SystemAudioStatus,
    received: Vec<CecCommand>,
}

impl Default for VirtualTv {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTv {
    /// Create a TV in standby
    pub fn new() -> Self {
        Self {
            osd_name: "TV".to_string(),
            vendor_id: VendorId::UNKNOWN,
            power: PowerStatus::Standby,
            active_source: None,
            arc_active: false,
            system_audio: SystemAudioStatus::Unknown,
            received: Vec::new(),
        }
    }

    /// Builder: report `vendor_id` when asked
    pub fn with_vendor(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub fn power_status(&self) -> PowerStatus {
        self.power
    }

    pub fn set_power_status(&mut self, power: PowerStatus) {
        self.power = power;
    }

    /// Physical address of the last announced active source
    pub fn active_source(&self) -> Option<PhysicalAddress> {
        self.active_source
    }

    pub fn arc_active(&self) -> bool {
        self.arc_active
    }

    /// Last system audio mode announced by the audio system
    pub fn system_audio(&self) -> SystemAudioStatus {
        self.system_audio
    }

    fn reply(&self, to: LogicalAddress, opcode: Opcode) -> CecCommand {
        CecCommand::new(LogicalAddress::Tv, to, opcode)
    }

    fn power_on(&mut self) {
        if self.power != PowerStatus::On {
            debug!("virtual TV powering on");
            self.power = PowerStatus::On;
        }
    }
}

impl VirtualDevice for VirtualTv {
    fn logical_address(&self) -> LogicalAddress {
        LogicalAddress::Tv
    }

    fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::ROOT
    }

    fn receive(&mut self, command: &CecCommand) -> Vec<CecCommand> {
        self.received.push(command.clone());
        let Some(opcode) = command.opcode else {
            return Vec::new();
        };
        let from = command.initiator;

        match opcode {
            Opcode::GiveDevicePowerStatus => {
                vec![self.reply(from, Opcode::ReportPowerStatus).with_u8(self.power.as_u8())]
            }
            Opcode::GivePhysicalAddress => vec![self
                .reply(LogicalAddress::Broadcast, Opcode::ReportPhysicalAddress)
                .with_physical_address(PhysicalAddress::ROOT)
                .with_u8(DeviceType::Tv.as_u8())],
            Opcode::GiveDeviceVendorId if self.vendor_id.is_known() => vec![self
                .reply(LogicalAddress::Broadcast, Opcode::DeviceVendorId)
                .with_bytes(&self.vendor_id.to_bytes())],
            Opcode::GiveDeviceVendorId => vec![feature_abort(command, AbortReason::UnableToDetermine)],
            Opcode::GiveOsdName => vec![self
                .reply(from, Opcode::SetOsdName)
                .with_bytes(self.osd_name.as_bytes())],
            Opcode::GetCecVersion => {
                vec![self.reply(from, Opcode::CecVersion).with_u8(CecVersion::V1_4.as_u8())]
            }
            Opcode::ImageViewOn | Opcode::TextViewOn => {
                self.power_on();
                Vec::new()
            }
            Opcode::Standby => {
                self.power = PowerStatus::Standby;
                Vec::new()
            }
            Opcode::ActiveSource => {
                match command.physical_address_at(0) {
                    Some(address) => {
                        debug!("virtual TV switching to {}", address);
                        self.active_source = Some(address);
                    }
                    None if !command.is_broadcast() => {
                        return vec![feature_abort(command, AbortReason::InvalidOperand)]
                    }
                    None => {}
                }
                Vec::new()
            }
            Opcode::StartArc | Opcode::EndArc => {
                let start = opcode == Opcode::StartArc;
                self.arc_active = start;
                let report = if start {
                    Opcode::ReportArcStarted
                } else {
                    Opcode::ReportArcEnded
                };
                vec![self.reply(from, report)]
            }
            Opcode::SetSystemAudioMode => {
                if let Some(mode) = command
                    .parameters
                    .first()
                    .and_then(|byte| SystemAudioStatus::try_from(*byte).ok())
                {
                    self.system_audio = mode;
                }
                Vec::new()
            }
            _ if (opcode.is_request() || !opcode.is_known()) && !command.is_broadcast() => {
                vec![feature_abort(command, AbortReason::UnrecognizedOpcode)]
            }
            _ => Vec::new(),
        }
    }

    fn received(&self) -> &[CecCommand] {
        &self.received
    }
}
