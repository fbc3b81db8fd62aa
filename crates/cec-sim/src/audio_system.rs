//! Virtual audio system
//!
//! Simulates an amplifier or soundbar at logical address 5. It keeps volume
//! and mute, the system audio mode, the return channel state and the short
//! audio descriptors it reports.

use cec_protocol::{
    AbortReason, AudioStatus, CecCommand, CecVersion, DeviceType, LogicalAddress, Opcode,
    PhysicalAddress, PowerStatus, SystemAudioStatus, UserControlCode, VendorId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{feature_abort, VirtualDevice};

/// Volume change per key press
const VOLUME_STEP: u8 = 1;

/// Configuration for creating a virtual audio system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualAudioSystemConfig {
    pub osd_name: String,
    pub physical_address: PhysicalAddress,
    pub vendor_id: VendorId,
    /// Initial volume in percent
    pub volume: u8,
    /// Three-byte short audio descriptors, as carried in a report
    pub descriptors: Vec<[u8; 3]>,
}

impl Default for VirtualAudioSystemConfig {
    fn default() -> Self {
        Self {
            osd_name: "Amplifier".to_string(),
            physical_address: PhysicalAddress(0x1000),
            vendor_id: VendorId::DENON,
            volume: 25,
            // LPCM 2ch 32-48kHz 16-24 bit, AC-3 6ch 32-48kHz 640kbps
            descriptors: vec![[0x09, 0x07, 0x07], [0x15, 0x07, 0x50]],
        }
    }
}

/// A simulated audio system
#[derive(Debug)]
pub struct VirtualAudioSystem {
    osd_name: String,
    physical_address: PhysicalAddress,
    vendor_id: VendorId,
    power: PowerStatus,
    volume: u8,
    muted: bool,
    system_audio: SystemAudioStatus,
    arc_active: bool,
    descriptors: Vec<[u8; 3]>,
    received: Vec<CecCommand>,
}

impl Default for VirtualAudioSystem {
    fn default() -> Self {
        Self::from_config(VirtualAudioSystemConfig::default())
    }
}

impl VirtualAudioSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: VirtualAudioSystemConfig) -> Self {
        Self {
            osd_name: config.osd_name,
            physical_address: config.physical_address,
            vendor_id: config.vendor_id,
            power: PowerStatus::On,
            volume: config.volume.min(100),
            muted: false,
            system_audio: SystemAudioStatus::Off,
            arc_active: false,
            descriptors: config.descriptors,
            received: Vec::new(),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn audio_status(&self) -> AudioStatus {
        AudioStatus::new(self.volume, self.muted)
    }

    pub fn system_audio(&self) -> SystemAudioStatus {
        self.system_audio
    }

    pub fn arc_active(&self) -> bool {
        self.arc_active
    }

    pub fn power_status(&self) -> PowerStatus {
        self.power
    }

    fn reply(&self, to: LogicalAddress, opcode: Opcode) -> CecCommand {
        CecCommand::new(LogicalAddress::AudioSystem, to, opcode)
    }

    fn report_audio_status(&self, to: LogicalAddress) -> CecCommand {
        self.reply(to, Opcode::ReportAudioStatus)
            .with_u8(self.audio_status().0)
    }

    /// Descriptor matching an audio format code, if supported
    fn descriptor_for(&self, format_code: u8) -> Option<[u8; 3]> {
        self.descriptors
            .iter()
            .copied()
            .find(|bytes| (bytes[0] >> 3) & 0x0F == format_code)
    }

    fn handle_system_audio_mode_request(&mut self, command: &CecCommand) -> Vec<CecCommand> {
        self.system_audio = match command.parameters.len() {
            0 => SystemAudioStatus::Off,
            2 => {
                self.power = PowerStatus::On;
                SystemAudioStatus::On
            }
            _ => return vec![feature_abort(command, AbortReason::InvalidOperand)],
        };
        debug!("virtual audio system: system audio {}", self.system_audio);
        vec![self
            .reply(LogicalAddress::Broadcast, Opcode::SetSystemAudioMode)
            .with_u8(self.system_audio.as_u8())]
    }

    fn handle_short_audio_descriptor_request(&self, command: &CecCommand) -> Vec<CecCommand> {
        if command.parameters.is_empty() || command.parameters.len() > 4 {
            return vec![feature_abort(command, AbortReason::InvalidOperand)];
        }
        let reported: Vec<u8> = command
            .parameters
            .iter()
            .filter_map(|format| self.descriptor_for(format & 0x3F))
            .flatten()
            .collect();
        if reported.is_empty() {
            return vec![feature_abort(command, AbortReason::InvalidOperand)];
        }
        vec![self
            .reply(command.initiator, Opcode::ReportShortAudioDescriptor)
            .with_bytes(&reported)]
    }

    fn handle_key(&mut self, command: &CecCommand) -> Vec<CecCommand> {
        let Some(key) = command
            .parameters
            .first()
            .and_then(|byte| UserControlCode::try_from(*byte).ok())
        else {
            return vec![feature_abort(command, AbortReason::InvalidOperand)];
        };
        match key {
            UserControlCode::VolumeUp => {
                self.volume = self.volume.saturating_add(VOLUME_STEP).min(100);
                self.muted = false;
            }
            UserControlCode::VolumeDown => {
                self.volume = self.volume.saturating_sub(VOLUME_STEP);
                self.muted = false;
            }
            UserControlCode::Mute => self.muted = !self.muted,
            UserControlCode::PowerOffFunction => {
                self.power = PowerStatus::Standby;
                return Vec::new();
            }
            UserControlCode::PowerOnFunction => {
                self.power = PowerStatus::On;
                return Vec::new();
            }
            _ => return Vec::new(),
        }
        vec![self.report_audio_status(command.initiator)]
    }
}

impl VirtualDevice for VirtualAudioSystem {
    fn logical_address(&self) -> LogicalAddress {
        LogicalAddress::AudioSystem
    }

    fn physical_address(&self) -> PhysicalAddress {
        self.physical_address
    }

    fn receive(&mut self, command: &CecCommand) -> Vec<CecCommand> {
        self.received.push(command.clone());
        let Some(opcode) = command.opcode else {
            return Vec::new();
        };
        let from = command.initiator;

        match opcode {
            Opcode::GiveAudioStatus => vec![self.report_audio_status(from)],
            Opcode::GiveSystemAudioModeStatus => vec![self
                .reply(from, Opcode::SystemAudioModeStatus)
                .with_u8(self.system_audio.as_u8())],
            Opcode::SystemAudioModeRequest => self.handle_system_audio_mode_request(command),
            Opcode::RequestArcStart | Opcode::RequestArcEnd => {
                if !command.parameters.is_empty() {
                    return vec![feature_abort(command, AbortReason::InvalidOperand)];
                }
                let response = if opcode == Opcode::RequestArcStart {
                    Opcode::StartArc
                } else {
                    Opcode::EndArc
                };
                vec![self.reply(from, response)]
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
            Opcode::ReportArcStarted => {
                self.arc_active = true;
                Vec::new()
            }
            Opcode::ReportArcEnded => {
                self.arc_active = false;
                Vec::new()
            }
            Opcode::RequestShortAudioDescriptor => {
                self.handle_short_audio_descriptor_request(command)
            }
            Opcode::UserControlPressed => self.handle_key(command),
            Opcode::UserControlRelease => Vec::new(),
            Opcode::GiveDevicePowerStatus => {
                vec![self.reply(from, Opcode::ReportPowerStatus).with_u8(self.power.as_u8())]
            }
            Opcode::GivePhysicalAddress => vec![self
                .reply(LogicalAddress::Broadcast, Opcode::ReportPhysicalAddress)
                .with_physical_address(self.physical_address)
                .with_u8(DeviceType::AudioSystem.as_u8())],
            Opcode::GiveDeviceVendorId => vec![self
                .reply(LogicalAddress::Broadcast, Opcode::DeviceVendorId)
                .with_bytes(&self.vendor_id.to_bytes())],
            Opcode::GiveOsdName => vec![self
                .reply(from, Opcode::SetOsdName)
                .with_bytes(self.osd_name.as_bytes())],
            Opcode::GetCecVersion => {
                vec![self.reply(from, Opcode::CecVersion).with_u8(CecVersion::V1_4.as_u8())]
            }
            Opcode::Standby => {
                self.power = PowerStatus::Standby;
                self.system_audio = SystemAudioStatus::Off;
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
