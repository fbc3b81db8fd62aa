//! Command dispatcher
//!
//! Maps a received command to its handler by opcode. A handler validates the
//! parameters, updates device state and may queue a reply through the
//! transmit engine. It answers either [`Handled`] or the [`AbortReason`] to
//! send back to the initiator.
//!
//! On success the initiator's device is signalled with the handled opcode so
//! that a transmit waiting for it completes. On failure a feature abort is
//! sent when the destination is one of ours, and malformed commands are kept
//! in the [`UnmappedCommandLog`].

use std::sync::{Arc, Mutex};

use cec_protocol::{
    AbortReason, ArcStatus, AudioStatus, CecCommand, CecVersion, DeckControlMode,
    LogicalAddress, MenuRequestType, MenuState, Opcode, PowerStatus, ShortAudioDescriptor,
    SystemAudioStatus, UserControlCode, VendorId,
};
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::adapter::BusAdapter;
use crate::device::{lock_recovering, BusDevice, DeviceStatus};
use crate::diagnostics::UnmappedCommandLog;
use crate::registry::DeviceRegistry;
use crate::transmit::TransmitEngine;
use crate::vendor::VendorProfile;

/// Outcome of a handler that accepted its command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Processed,
    /// The initiator's vendor profile changed; run the command again
    Redispatch,
}

type HandlerResult = Result<Handled, AbortReason>;

const PROCESSED: HandlerResult = Ok(Handled::Processed);

fn expect_len(command: &CecCommand, len: usize) -> Result<(), AbortReason> {
    if command.parameters.len() == len {
        Ok(())
    } else {
        Err(AbortReason::InvalidOperand)
    }
}

pub struct CommandDispatcher<A> {
    registry: Arc<DeviceRegistry>,
    engine: Arc<TransmitEngine<A>>,
    unmapped: Mutex<UnmappedCommandLog>,
}

impl<A: BusAdapter> CommandDispatcher<A> {
    pub fn new(engine: Arc<TransmitEngine<A>>) -> Self {
        Self {
            registry: engine.registry().clone(),
            engine,
            unmapped: Mutex::new(UnmappedCommandLog::new()),
        }
    }

    pub fn engine(&self) -> &Arc<TransmitEngine<A>> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Copy of the diagnostic log
    pub fn unmapped_commands(&self) -> UnmappedCommandLog {
        lock_recovering(&self.unmapped).clone()
    }

    /// Handle a received command; true iff it was handled
    pub async fn handle_command(&self, command: &CecCommand) -> bool {
        let Some(opcode) = command.opcode else {
            self.handle_poll(command);
            return true;
        };

        debug!(
            "HandleCommand initiator={}, destination={}, command={:02x}",
            command.initiator.as_u8(),
            command.destination.as_u8(),
            opcode.as_u8()
        );

        if command.initiator.is_device() {
            if let Some(device) = self.registry.device(command.initiator) {
                device.mark_present();
            }
        }

        let mut result = self.dispatch(opcode, command).await;
        if result == Ok(Handled::Redispatch) {
            debug!(">> process after selecting vendor profile: {}", command);
            result = self.dispatch(opcode, command).await;
        }

        match result {
            Ok(_) => {
                self.signal_handled(opcode, command);
                true
            }
            Err(reason) => {
                self.unhandled(opcode, command, reason).await;
                false
            }
        }
    }

    fn handle_poll(&self, command: &CecCommand) {
        if let Some(initiator) = self.registry.device(command.initiator) {
            initiator.mark_present();
        }
        if command.destination.is_device() {
            if let Some(destination) = self.registry.device(command.destination) {
                destination.handle_poll(command.initiator);
            }
        }
    }

    fn signal_handled(&self, opcode: Opcode, command: &CecCommand) {
        let Some(initiator) = self.registry.device(command.initiator) else {
            return;
        };
        if opcode == Opcode::FeatureAbort {
            // Wake the transmit that is waiting on the rejected opcode
            if let Some(aborted) = command
                .parameters
                .first()
                .map(|byte| Opcode::from_u8(*byte))
            {
                initiator.signal_opcode(aborted);
            }
        } else {
            initiator.signal_opcode(opcode);
        }
    }

    async fn unhandled(&self, opcode: Opcode, command: &CecCommand, reason: AbortReason) {
        if !self.registry.is_handled_locally(command.destination) {
            debug!(
                "'{}' from {} not handled ({}), destination is not local",
                opcode, command.initiator, reason
            );
            return;
        }
        debug!(
            "sending abort with opcode {:02x} and reason '{}' to {}",
            opcode.as_u8(),
            reason,
            command.initiator
        );
        self.engine
            .transmit_abort(command.destination, command.initiator, opcode, reason)
            .await;

        if reason == AbortReason::InvalidOperand {
            lock_recovering(&self.unmapped).record(command);
        }
    }

    async fn dispatch(&self, opcode: Opcode, command: &CecCommand) -> HandlerResult {
        match opcode {
            Opcode::ReportPowerStatus => self.handle_report_power_status(command),
            Opcode::CecVersion => self.handle_cec_version(command),
            Opcode::SetMenuLanguage => self.handle_set_menu_language(command),
            Opcode::GivePhysicalAddress => self.handle_give_physical_address(command).await,
            Opcode::GetMenuLanguage => self.handle_get_menu_language(command).await,
            Opcode::GiveOsdName => self.handle_give_osd_name(command).await,
            Opcode::GiveDeviceVendorId => self.handle_give_device_vendor_id(command).await,
            Opcode::DeviceVendorId => self.handle_device_vendor_id(command).await,
            Opcode::VendorCommandWithId => self.handle_vendor_command_with_id(command),
            Opcode::VendorCommand => Err(AbortReason::InvalidOperand),
            Opcode::VendorRemoteButtonDown | Opcode::VendorRemoteButtonUp => {
                self.handle_vendor_remote_button(command)
            }
            Opcode::GiveDeckStatus => self.handle_give_deck_status(command).await,
            Opcode::DeckControl => self.handle_deck_control(command),
            Opcode::MenuRequest => self.handle_menu_request(command).await,
            Opcode::GiveDevicePowerStatus => self.handle_give_device_power_status(command).await,
            Opcode::GetCecVersion => self.handle_get_cec_version(command).await,
            Opcode::UserControlPressed => self.handle_user_control_pressed(command).await,
            Opcode::UserControlRelease => self.handle_user_control_release(command),
            Opcode::GiveAudioStatus => self.handle_give_audio_status(command).await,
            Opcode::GiveSystemAudioModeStatus => {
                self.handle_give_system_audio_mode_status(command).await
            }
            Opcode::SystemAudioModeRequest => self.handle_system_audio_mode_request(command).await,
            Opcode::ReportAudioStatus => self.handle_report_audio_status(command),
            Opcode::SystemAudioModeStatus | Opcode::SetSystemAudioMode => {
                self.handle_system_audio_mode_status(command)
            }
            Opcode::RequestActiveSource => self.handle_request_active_source(command).await,
            Opcode::SetStreamPath => self.handle_set_stream_path(command).await,
            Opcode::RoutingChange => self.handle_routing_change(command),
            Opcode::RoutingInformation => self.handle_routing_information(command),
            Opcode::Standby => self.handle_standby(command),
            Opcode::ActiveSource => self.handle_active_source(command),
            Opcode::ReportPhysicalAddress => self.handle_report_physical_address(command).await,
            Opcode::SetOsdName => self.handle_set_osd_name(command),
            Opcode::ImageViewOn => self.handle_image_view_on(command),
            Opcode::TextViewOn => self.handle_text_view_on(command),
            Opcode::FeatureAbort => self.handle_feature_abort(command),
            Opcode::ReportArcStarted | Opcode::ReportArcEnded => {
                debug!("{} reported '{}'", command.initiator, opcode);
                PROCESSED
            }
            Opcode::RequestArcStart => self.handle_request_arc(command, true).await,
            Opcode::RequestArcEnd => self.handle_request_arc(command, false).await,
            Opcode::StartArc => self.handle_arc_status(command, ArcStatus::On),
            Opcode::EndArc => self.handle_arc_status(command, ArcStatus::Off),
            Opcode::ReportShortAudioDescriptor => self.handle_report_short_audio_descriptor(command),
            // Player applications act on this; it must not be aborted
            Opcode::Play => PROCESSED,
            _ => Err(AbortReason::UnrecognizedOpcode),
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn initiator(&self, command: &CecCommand) -> Result<&BusDevice, AbortReason> {
        self.registry
            .device(command.initiator)
            .ok_or(AbortReason::InvalidOperand)
    }

    /// Destination of a request that one of our devices must answer
    fn local_destination(&self, command: &CecCommand) -> Result<&BusDevice, AbortReason> {
        if !self.registry.is_initialised() || !self.registry.is_handled_locally(command.destination)
        {
            return Err(AbortReason::NotInCorrectModeToRespond);
        }
        self.registry
            .device(command.destination)
            .ok_or(AbortReason::InvalidOperand)
    }

    // ------------------------------------------------------------------
    // Generic device state
    // ------------------------------------------------------------------

    fn handle_report_power_status(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 1)?;
        let status =
            PowerStatus::try_from(command.parameters[0]).map_err(|_| AbortReason::InvalidOperand)?;
        self.initiator(command)?.set_power_status(status);
        PROCESSED
    }

    fn handle_cec_version(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 1)?;
        let version = CecVersion::try_from(command.parameters[0]).unwrap_or(CecVersion::Unknown);
        self.initiator(command)?.set_cec_version(version);
        PROCESSED
    }

    fn handle_set_menu_language(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 3)?;
        let language = [
            command.parameters[0],
            command.parameters[1],
            command.parameters[2],
        ];
        self.initiator(command)?.set_menu_language(language);
        PROCESSED
    }

    fn handle_set_osd_name(&self, command: &CecCommand) -> HandlerResult {
        if command.parameters.is_empty() {
            return Err(AbortReason::InvalidOperand);
        }
        let name = String::from_utf8_lossy(&command.parameters).into_owned();
        self.initiator(command)?.set_osd_name(name);
        PROCESSED
    }

    async fn handle_report_physical_address(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 3)?;
        let address = command
            .physical_address_at(0)
            .ok_or(AbortReason::InvalidOperand)?;
        self.initiator(command)?.set_physical_address(address);

        if command.initiator == LogicalAddress::Tv {
            if let Some(primary) = self.registry.primary_local_device() {
                primary.transmit_physical_address(&self.engine, false).await;
            }
        }
        PROCESSED
    }

    async fn handle_device_vendor_id(&self, command: &CecCommand) -> HandlerResult {
        let vendor =
            VendorId::from_slice(&command.parameters).map_err(|_| AbortReason::InvalidOperand)?;
        self.initiator(command)?.set_vendor_id(vendor);

        if command.initiator == LogicalAddress::Tv {
            if let Some(primary) = self.registry.primary_local_device() {
                primary
                    .transmit_vendor_id(&self.engine, LogicalAddress::Broadcast, false)
                    .await;
            }
        }
        PROCESSED
    }

    fn handle_vendor_command_with_id(&self, command: &CecCommand) -> HandlerResult {
        let vendor =
            VendorId::from_slice(&command.parameters).map_err(|_| AbortReason::InvalidOperand)?;

        if let Some(device) = self.registry.device(command.initiator) {
            if !device.vendor_id().is_known() && device.set_vendor_id(vendor) {
                let profile = device.vendor_profile();
                if !profile.is_generic() {
                    info!(
                        "{} selected the {} profile, reprocessing {}",
                        command.initiator, profile, command
                    );
                    return Ok(Handled::Redispatch);
                }
            }
        }

        if VendorProfile::for_vendor(vendor).refuses_vendor_commands_from(command.initiator) {
            debug!("ignoring vendor command from {} ({})", command.initiator, vendor);
            return Err(AbortReason::Refused);
        }
        Err(AbortReason::InvalidOperand)
    }

    fn handle_vendor_remote_button(&self, command: &CecCommand) -> HandlerResult {
        let Some(keycode) = command.parameters.first() else {
            return Err(AbortReason::InvalidOperand);
        };
        info!(
            "unhandled vendor remote button received with keycode {:02x}",
            keycode
        );
        PROCESSED
    }

    fn handle_routing_change(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 4)?;
        let route = command
            .physical_address_at(2)
            .ok_or(AbortReason::InvalidOperand)?;
        self.initiator(command)?.set_active_route(route);
        PROCESSED
    }

    fn handle_routing_information(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 2)?;
        let route = command
            .physical_address_at(0)
            .ok_or(AbortReason::InvalidOperand)?;
        let device = self.initiator(command)?;
        device.set_active_route(route);
        device.set_routing_information_response(route);
        PROCESSED
    }

    fn handle_standby(&self, command: &CecCommand) -> HandlerResult {
        let packed = command.header_byte();
        debug!(
            "{} requests standby of {}",
            command.initiator, command.destination
        );
        if let Some(device) = self.registry.device(command.initiator) {
            device.set_power_status(PowerStatus::Standby);
            device.set_standby_status(packed);
        }
        PROCESSED
    }

    fn handle_active_source(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 2)?;
        let address = command
            .physical_address_at(0)
            .ok_or(AbortReason::InvalidOperand)?;
        if let Some(device) = self.registry.device(command.initiator) {
            device.set_physical_address(address);
            self.registry.mark_as_active_source(command.initiator);
            device.set_stream_path_response(address);
        }
        self.registry.signal_all(Opcode::ActiveSource);
        PROCESSED
    }

    fn handle_image_view_on(&self, command: &CecCommand) -> HandlerResult {
        if let Some(device) = self.registry.device(command.destination) {
            let status = device.power_status();
            if device.status() == DeviceStatus::Present
                && (status == PowerStatus::Standby
                    || status == PowerStatus::InTransitionOnToStandby)
            {
                device.set_power_status(PowerStatus::InTransitionStandbyToOn);
            }
        }
        PROCESSED
    }

    fn handle_text_view_on(&self, command: &CecCommand) -> HandlerResult {
        self.registry.mark_as_active_source(command.initiator);
        PROCESSED
    }

    fn handle_feature_abort(&self, command: &CecCommand) -> HandlerResult {
        // Processed rather than InvalidOperand: an abort is never answered with an abort
        let [aborted, reason] = command.parameters[..] else {
            debug!("ignoring malformed feature abort {}", command);
            return PROCESSED;
        };
        let Some(device) = self.registry.device(command.initiator) else {
            return PROCESSED;
        };

        debug!(
            "{} aborted opcode {:02x} with reason {:02x}",
            command.initiator, aborted, reason
        );
        let rejected = reason == AbortReason::UnrecognizedOpcode.as_u8()
            || reason == AbortReason::Refused.as_u8();
        if rejected {
            device.set_unsupported_feature(Opcode::from_u8(aborted));
        }
        device.set_feature_abort_status(aborted, reason);

        if aborted == Opcode::RequestShortAudioDescriptor.as_u8() {
            if let Some(audio) = device.as_audio_system() {
                audio.set_short_audio_descriptor(ShortAudioDescriptor::from_feature_abort(
                    Opcode::FeatureAbort.as_u8(),
                    [aborted, reason],
                ));
            }
        }
        PROCESSED
    }

    // ------------------------------------------------------------------
    // Requests answered by local devices
    // ------------------------------------------------------------------

    async fn handle_give_physical_address(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device.transmit_physical_address(&self.engine, true).await;
        PROCESSED
    }

    async fn handle_get_menu_language(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device.transmit_set_menu_language(&self.engine, true).await;
        PROCESSED
    }

    async fn handle_give_osd_name(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device
            .transmit_osd_name(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_give_device_vendor_id(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device
            .transmit_vendor_id(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_give_device_power_status(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device
            .transmit_power_state(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_get_cec_version(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device
            .transmit_cec_version(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_menu_request(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        let request = command
            .parameters
            .first()
            .and_then(|byte| MenuRequestType::try_from(*byte).ok())
            .ok_or(AbortReason::InvalidOperand)?;
        match request {
            MenuRequestType::Activate => {
                device.set_menu_state(MenuState::Activated);
            }
            MenuRequestType::Deactivate => {
                device.set_menu_state(MenuState::Deactivated);
            }
            MenuRequestType::Query => {}
        }
        device
            .transmit_menu_state(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_request_active_source(&self, command: &CecCommand) -> HandlerResult {
        if !self.registry.is_initialised() {
            return PROCESSED;
        }
        debug!(">> {} requests active source", command.initiator.as_u8());
        if let Some(initiator) = self.registry.device(command.initiator) {
            initiator.set_power_status(PowerStatus::On);
        }
        for device in self.registry.local_devices() {
            device.transmit_active_source(&self.engine, true).await;
        }
        PROCESSED
    }

    async fn handle_set_stream_path(&self, command: &CecCommand) -> HandlerResult {
        if !self.registry.is_initialised() {
            return Err(AbortReason::NotInCorrectModeToRespond);
        }
        let address = command
            .physical_address_at(0)
            .ok_or(AbortReason::InvalidOperand)?;
        debug!(
            ">> {} ({}) sets stream path to physical address {}",
            command.initiator.name(),
            command.initiator.as_u8(),
            address
        );

        let device = self
            .registry
            .device_by_physical_address(address)
            .ok_or(AbortReason::InvalidOperand)?;
        if device.is_handled_locally() {
            if device.is_active_source() {
                self.registry.mark_as_active_source(device.logical_address());
                device.transmit_active_source(&self.engine, true).await;
            } else {
                device.activate_source(&self.engine, Duration::ZERO).await;
            }
        }
        PROCESSED
    }

    async fn handle_user_control_pressed(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        let Some(&code) = command.parameters.first() else {
            return Err(AbortReason::InvalidOperand);
        };
        let key = UserControlCode::try_from(code).ok();
        device.set_current_button(key);

        match key {
            Some(UserControlCode::PowerOffFunction) => {}
            Some(key) if key.is_power_key() => {
                // Power and power toggle act as a toggle, power on does not
                let power_on = match key {
                    UserControlCode::PowerOnFunction => true,
                    _ => !matches!(
                        device.power_status(),
                        PowerStatus::On | PowerStatus::InTransitionStandbyToOn
                    ),
                };
                if power_on {
                    device.activate_source(&self.engine, Duration::ZERO).await;
                } else {
                    self.registry
                        .mark_as_inactive_source(device.logical_address());
                    device.transmit_inactive_source(&self.engine).await;
                    device.set_menu_state(MenuState::Deactivated);
                }
            }
            _ => {
                // The TV sends keys to us, so it forgot to make us active
                if !device.is_active_source() && command.initiator == LogicalAddress::Tv {
                    self.registry
                        .mark_as_active_source(device.logical_address());
                }
            }
        }
        PROCESSED
    }

    fn handle_user_control_release(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        device.set_current_button(None);
        PROCESSED
    }

    async fn handle_give_deck_status(&self, command: &CecCommand) -> HandlerResult {
        let device = self.local_destination(command)?;
        let playback = device
            .as_playback_device()
            .ok_or(AbortReason::InvalidOperand)?;
        playback
            .transmit_deck_status(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    fn handle_deck_control(&self, command: &CecCommand) -> HandlerResult {
        let playback = self
            .registry
            .device(command.destination)
            .and_then(BusDevice::as_playback_device)
            .ok_or(AbortReason::InvalidOperand)?;
        let mode = command
            .parameters
            .first()
            .and_then(|byte| DeckControlMode::try_from(*byte).ok())
            .ok_or(AbortReason::InvalidOperand)?;
        playback.set_deck_control_mode(mode);
        PROCESSED
    }

    // ------------------------------------------------------------------
    // Audio system
    // ------------------------------------------------------------------

    fn handle_report_audio_status(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 1)?;
        let audio = self
            .initiator(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        audio.set_audio_status(AudioStatus(command.parameters[0]));
        PROCESSED
    }

    fn handle_system_audio_mode_status(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 1)?;
        let audio = self
            .initiator(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        let mode = SystemAudioStatus::try_from(command.parameters[0])
            .map_err(|_| AbortReason::InvalidOperand)?;
        audio.set_system_audio_mode_status(mode);
        PROCESSED
    }

    async fn handle_give_audio_status(&self, command: &CecCommand) -> HandlerResult {
        let audio = self
            .local_destination(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        audio
            .transmit_audio_status(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_give_system_audio_mode_status(&self, command: &CecCommand) -> HandlerResult {
        let audio = self
            .local_destination(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        audio
            .transmit_system_audio_mode_status(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_system_audio_mode_request(&self, command: &CecCommand) -> HandlerResult {
        let audio = self
            .local_destination(command)?
            .as_audio_system()
            .ok_or(AbortReason::NotInCorrectModeToRespond)?;

        match command.physical_address_at(0) {
            Some(address) => {
                audio.device().set_power_status(PowerStatus::On);
                audio.set_system_audio_mode_status(SystemAudioStatus::On);
                if let Some(source) = self.registry.device_by_physical_address(address) {
                    self.registry.mark_as_active_source(source.logical_address());
                }
            }
            None => {
                audio.set_system_audio_mode_status(SystemAudioStatus::Off);
            }
        }
        audio
            .transmit_set_system_audio_mode(&self.engine, command.initiator, true)
            .await;
        PROCESSED
    }

    async fn handle_request_arc(&self, command: &CecCommand, start: bool) -> HandlerResult {
        let audio = self
            .local_destination(command)
            .map_err(|_| AbortReason::InvalidOperand)?
            .as_audio_system();
        let Some(audio) = audio else {
            error!(
                "ARC request: destination {} is not an audio system",
                command.destination
            );
            return Err(AbortReason::InvalidOperand);
        };

        debug!(
            "audio system exists, send {} ARC to TV",
            if start { "initiate" } else { "terminate" }
        );
        if audio
            .transmit_arc_start_end(&self.engine, LogicalAddress::Tv, start)
            .await
        {
            return PROCESSED;
        }
        error!("failed to send ARC {}", if start { "start" } else { "end" });
        Err(AbortReason::InvalidOperand)
    }

    fn handle_arc_status(&self, command: &CecCommand, status: ArcStatus) -> HandlerResult {
        expect_len(command, 0)?;
        let audio = self
            .initiator(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        audio.set_arc_status(status);
        PROCESSED
    }

    fn handle_report_short_audio_descriptor(&self, command: &CecCommand) -> HandlerResult {
        expect_len(command, 3)?;
        let audio = self
            .initiator(command)?
            .as_audio_system()
            .ok_or(AbortReason::InvalidOperand)?;
        audio.set_short_audio_descriptor(ShortAudioDescriptor::from_report([
            command.parameters[0],
            command.parameters[1],
            command.parameters[2],
        ]));
        PROCESSED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine_with, RecordingAdapter};
    use crate::HandlerConfig;
    use cec_protocol::PhysicalAddress;

    struct Fixture {
        registry: Arc<DeviceRegistry>,
        adapter: Arc<RecordingAdapter>,
        dispatcher: CommandDispatcher<Arc<RecordingAdapter>>,
    }

    /// Local audio system at 1.0.0.0 and playback device at 2.0.0.0
    fn fixture() -> Fixture {
        let registry = Arc::new(DeviceRegistry::new(&HandlerConfig::default()));
        let adapter = Arc::new(RecordingAdapter::new());
        let engine = Arc::new(engine_with(registry.clone(), adapter.clone()));
        registry.register_local(LogicalAddress::AudioSystem, PhysicalAddress(0x1000));
        registry.register_local(LogicalAddress::Playback1, PhysicalAddress(0x2000));
        registry.set_initialised(true);
        Fixture {
            registry,
            adapter,
            dispatcher: CommandDispatcher::new(engine),
        }
    }

    fn cmd(initiator: LogicalAddress, destination: LogicalAddress, opcode: Opcode, params: &[u8]) -> CecCommand {
        CecCommand::new(initiator, destination, opcode).with_bytes(params)
    }

    fn audio_state(f: &Fixture) -> crate::audio::AudioSystemState {
        f.registry
            .device(LogicalAddress::AudioSystem)
            .and_then(BusDevice::as_audio_system)
            .unwrap()
            .state()
    }

    #[tokio::test]
    async fn test_poll_is_always_handled() {
        let f = fixture();
        let poll = CecCommand::poll(LogicalAddress::Tv, LogicalAddress::Recording1);
        assert!(f.dispatcher.handle_command(&poll).await);
        assert_eq!(
            f.registry.device(LogicalAddress::Tv).unwrap().status(),
            DeviceStatus::Present
        );
        assert!(f.adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_report_audio_status_updates_once() {
        let f = fixture();
        let report = cmd(
            LogicalAddress::AudioSystem,
            LogicalAddress::Tv,
            Opcode::ReportAudioStatus,
            &[0x32],
        );
        // A remote audio system at 5 for this scenario
        f.registry.unregister_local(LogicalAddress::AudioSystem);

        assert!(f.dispatcher.handle_command(&report).await);
        assert_eq!(audio_state(&f).audio_status(), AudioStatus(0x32));

        let audio = f.registry.device(LogicalAddress::AudioSystem).unwrap();
        assert!(!audio.as_audio_system().unwrap().set_audio_status(AudioStatus(0x32)));
        assert!(f.dispatcher.handle_command(&report).await);
        assert_eq!(audio_state(&f).audio_status(), AudioStatus(0x32));
    }

    #[tokio::test]
    async fn test_unrecognized_opcode_aborts_once() {
        let f = fixture();
        let record = cmd(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::RecordOn, &[]);
        assert!(!f.dispatcher.handle_command(&record).await);

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::FeatureAbort));
        assert_eq!(sent[0].initiator, LogicalAddress::Playback1);
        assert_eq!(sent[0].destination, LogicalAddress::Tv);
        assert_eq!(
            sent[0].parameters,
            vec![Opcode::RecordOn.as_u8(), AbortReason::UnrecognizedOpcode.as_u8()]
        );
        assert!(f.dispatcher.unmapped_commands().is_empty());
    }

    #[tokio::test]
    async fn test_unlisted_opcode_byte_is_echoed_in_abort() {
        let f = fixture();
        // Give Features, decoded from the wire without a table entry
        let give_features = CecCommand::decode(&[0x05, 0xA5]).unwrap();
        assert!(!f.dispatcher.handle_command(&give_features).await);

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::FeatureAbort));
        assert_eq!(sent[0].initiator, LogicalAddress::AudioSystem);
        assert_eq!(sent[0].destination, LogicalAddress::Tv);
        assert_eq!(
            sent[0].parameters,
            vec![0xA5, AbortReason::UnrecognizedOpcode.as_u8()]
        );
    }

    #[tokio::test]
    async fn test_feature_abort_of_unlisted_opcode_marks_unsupported() {
        let f = fixture();
        let abort = cmd(
            LogicalAddress::Tv,
            LogicalAddress::AudioSystem,
            Opcode::FeatureAbort,
            &[0x73, AbortReason::UnrecognizedOpcode.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&abort).await);
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert!(tv.is_unsupported_feature(Opcode::Unknown(0x73)));
    }

    #[tokio::test]
    async fn test_unhandled_for_remote_destination_sends_nothing() {
        let f = fixture();
        let record = cmd(LogicalAddress::Tv, LogicalAddress::Recording1, Opcode::RecordOn, &[]);
        assert!(!f.dispatcher.handle_command(&record).await);
        assert!(f.adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_operand_diagnostics_are_deduplicated() {
        let f = fixture();
        let vendor = |params: &[u8]| {
            cmd(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::VendorCommand, params)
        };
        assert!(!f.dispatcher.handle_command(&vendor(&[0x01])).await);
        assert!(!f.dispatcher.handle_command(&vendor(&[0x01])).await);
        assert_eq!(f.dispatcher.unmapped_commands().len(), 1);

        assert!(!f.dispatcher.handle_command(&vendor(&[0x02])).await);
        assert_eq!(f.dispatcher.unmapped_commands().len(), 2);
        assert_eq!(
            f.dispatcher
                .unmapped_commands()
                .commands(Opcode::VendorCommand)
                .len(),
            2
        );
        // Every rejection is still answered
        assert_eq!(f.adapter.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_feature_abort_marks_unsupported() {
        let f = fixture();
        let abort = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::FeatureAbort,
            &[Opcode::GiveOsdName.as_u8(), AbortReason::UnrecognizedOpcode.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&abort).await);

        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert!(tv.is_unsupported_feature(Opcode::GiveOsdName));
        assert_eq!(
            tv.feature_abort_reason(Opcode::GiveOsdName.as_u8()),
            Some(AbortReason::UnrecognizedOpcode.as_u8())
        );

        let request = CecCommand::new(LogicalAddress::Playback1, LogicalAddress::Tv, Opcode::GiveOsdName);
        assert!(f.dispatcher.engine().transmit(request, false, false).await);
        assert_eq!(f.adapter.attempts(), 0);
    }

    #[tokio::test]
    async fn test_short_feature_abort_is_processed_without_reply() {
        let f = fixture();
        let short = cmd(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::FeatureAbort, &[0x46]);
        assert!(f.dispatcher.handle_command(&short).await);
        assert!(f.adapter.sent().is_empty());
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert_eq!(tv.feature_abort_reason(0x46), None);
    }

    #[tokio::test]
    async fn test_feature_abort_with_other_reason_only_records() {
        let f = fixture();
        let abort = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::FeatureAbort,
            &[Opcode::GiveOsdName.as_u8(), AbortReason::InvalidOperand.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&abort).await);
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert!(!tv.is_unsupported_feature(Opcode::GiveOsdName));
        assert_eq!(
            tv.feature_abort_reason(Opcode::GiveOsdName.as_u8()),
            Some(AbortReason::InvalidOperand.as_u8())
        );
    }

    #[tokio::test]
    async fn test_aborted_descriptor_request_uses_abort_path_encoding() {
        let f = fixture();
        f.registry.unregister_local(LogicalAddress::AudioSystem);
        let abort = cmd(
            LogicalAddress::AudioSystem,
            LogicalAddress::Tv,
            Opcode::FeatureAbort,
            &[Opcode::RequestShortAudioDescriptor.as_u8(), AbortReason::InvalidOperand.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&abort).await);
        let descriptor = audio_state(&f).audio_descriptor();
        assert!(descriptor.is_abort_path());
        assert_eq!(descriptor.0, 0xFA00_A403);
    }

    #[tokio::test]
    async fn test_report_short_audio_descriptor() {
        let f = fixture();
        f.registry.unregister_local(LogicalAddress::AudioSystem);
        let report = cmd(
            LogicalAddress::AudioSystem,
            LogicalAddress::Tv,
            Opcode::ReportShortAudioDescriptor,
            &[0x09, 0x07, 0x07],
        );
        assert!(f.dispatcher.handle_command(&report).await);
        assert_eq!(audio_state(&f).audio_descriptor().0, 0x0009_0707);

        let short = cmd(
            LogicalAddress::AudioSystem,
            LogicalAddress::Tv,
            Opcode::ReportShortAudioDescriptor,
            &[0x09, 0x07],
        );
        assert!(!f.dispatcher.handle_command(&short).await);
    }

    #[tokio::test]
    async fn test_system_audio_mode_request_without_address_turns_off() {
        let f = fixture();
        let request = cmd(
            LogicalAddress::Tv,
            LogicalAddress::AudioSystem,
            Opcode::SystemAudioModeRequest,
            &[],
        );
        assert!(f.dispatcher.handle_command(&request).await);
        assert_eq!(audio_state(&f).system_audio_status(), SystemAudioStatus::Off);

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::SetSystemAudioMode));
        assert_eq!(sent[0].destination, LogicalAddress::Tv);
        assert_eq!(sent[0].parameters, vec![SystemAudioStatus::Off.as_u8()]);
    }

    #[tokio::test]
    async fn test_system_audio_mode_request_with_address_turns_on() {
        let f = fixture();
        f.registry
            .device(LogicalAddress::AudioSystem)
            .and_then(BusDevice::as_audio_system)
            .unwrap()
            .set_system_audio_mode_status(SystemAudioStatus::Off);

        let request = cmd(
            LogicalAddress::Tv,
            LogicalAddress::AudioSystem,
            Opcode::SystemAudioModeRequest,
            &[0x20, 0x00],
        );
        assert!(f.dispatcher.handle_command(&request).await);
        assert_eq!(audio_state(&f).system_audio_status(), SystemAudioStatus::On);
        assert_eq!(f.registry.active_source(), Some(LogicalAddress::Playback1));

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::SetSystemAudioMode));
        assert_eq!(sent[0].parameters, vec![SystemAudioStatus::On.as_u8()]);
    }

    #[tokio::test]
    async fn test_requests_need_initialised_processor() {
        let f = fixture();
        f.registry.set_initialised(false);
        let request = cmd(LogicalAddress::Tv, LogicalAddress::AudioSystem, Opcode::GiveAudioStatus, &[]);
        assert!(!f.dispatcher.handle_command(&request).await);

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].parameters,
            vec![
                Opcode::GiveAudioStatus.as_u8(),
                AbortReason::NotInCorrectModeToRespond.as_u8()
            ]
        );
    }

    #[tokio::test]
    async fn test_give_audio_status_replies() {
        let f = fixture();
        f.registry
            .device(LogicalAddress::AudioSystem)
            .and_then(BusDevice::as_audio_system)
            .unwrap()
            .set_audio_status(AudioStatus::new(40, false));
        let request = cmd(LogicalAddress::Tv, LogicalAddress::AudioSystem, Opcode::GiveAudioStatus, &[]);
        assert!(f.dispatcher.handle_command(&request).await);
        let sent = f.adapter.sent();
        assert_eq!(sent[0].opcode, Some(Opcode::ReportAudioStatus));
        assert_eq!(sent[0].parameters, vec![40]);
    }

    #[tokio::test]
    async fn test_start_and_end_arc_from_remote_audio_system() {
        let f = fixture();
        f.registry.unregister_local(LogicalAddress::AudioSystem);
        let start = cmd(LogicalAddress::AudioSystem, LogicalAddress::Tv, Opcode::StartArc, &[]);
        assert!(f.dispatcher.handle_command(&start).await);
        assert_eq!(audio_state(&f).arc_status(), ArcStatus::On);

        let end = cmd(LogicalAddress::AudioSystem, LogicalAddress::Tv, Opcode::EndArc, &[]);
        assert!(f.dispatcher.handle_command(&end).await);
        assert_eq!(audio_state(&f).arc_status(), ArcStatus::Off);

        let malformed = cmd(LogicalAddress::AudioSystem, LogicalAddress::Tv, Opcode::StartArc, &[0x00]);
        assert!(!f.dispatcher.handle_command(&malformed).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_arc_start_sends_start_arc_to_tv() {
        let f = fixture();
        f.adapter.answer_requests(f.registry.clone());
        let request = cmd(LogicalAddress::Tv, LogicalAddress::AudioSystem, Opcode::RequestArcStart, &[]);
        assert!(f.dispatcher.handle_command(&request).await);

        let sent = f.adapter.sent();
        assert_eq!(sent[0].opcode, Some(Opcode::StartArc));
        assert_eq!(sent[0].destination, LogicalAddress::Tv);
        assert!(audio_state(&f).arc_started());
    }

    #[tokio::test]
    async fn test_request_arc_end_failure_is_invalid_operand() {
        let f = fixture();
        f.adapter.fail_next(2);
        let request = cmd(LogicalAddress::Tv, LogicalAddress::AudioSystem, Opcode::RequestArcEnd, &[]);
        assert!(!f.dispatcher.handle_command(&request).await);
        assert!(!audio_state(&f).arc_started());

        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::FeatureAbort));
        assert_eq!(sent[0].parameters[1], AbortReason::InvalidOperand.as_u8());
    }

    #[tokio::test]
    async fn test_active_source_marks_initiator() {
        let f = fixture();
        let announce = cmd(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::ActiveSource, &[0x00, 0x00]);
        let mut rx = f
            .registry
            .device(LogicalAddress::Recording1)
            .unwrap()
            .subscribe_opcodes();

        assert!(f.dispatcher.handle_command(&announce).await);
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert!(tv.is_active_source());
        assert_eq!(tv.physical_address(), PhysicalAddress::ROOT);
        assert_eq!(tv.stream_path_response(), Some(PhysicalAddress::ROOT));
        assert_eq!(rx.try_recv().unwrap(), Opcode::ActiveSource);
    }

    #[tokio::test]
    async fn test_routing_information_records_response() {
        let f = fixture();
        let info = cmd(
            LogicalAddress::Recording1,
            LogicalAddress::Broadcast,
            Opcode::RoutingInformation,
            &[0x30, 0x00],
        );
        assert!(f.dispatcher.handle_command(&info).await);
        let device = f.registry.device(LogicalAddress::Recording1).unwrap();
        assert_eq!(device.active_route(), PhysicalAddress(0x3000));
        assert_eq!(
            device.routing_information_response(),
            Some(PhysicalAddress(0x3000))
        );
    }

    #[tokio::test]
    async fn test_standby_records_power_and_packed_addresses() {
        let f = fixture();
        let standby = cmd(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::Standby, &[]);
        assert!(f.dispatcher.handle_command(&standby).await);
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert_eq!(tv.power_status(), PowerStatus::Standby);
        assert_eq!(tv.standby_status(), Some(0x0F));
    }

    #[tokio::test]
    async fn test_vendor_command_with_id_selects_profile_and_redispatches() {
        let f = fixture();
        let lg = VendorId::LG.to_bytes();
        let vendor = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::VendorCommandWithId,
            &[lg[0], lg[1], lg[2], 0x01],
        );
        assert!(!f.dispatcher.handle_command(&vendor).await);
        let tv = f.registry.device(LogicalAddress::Tv).unwrap();
        assert_eq!(tv.vendor_id(), VendorId::LG);
        assert_eq!(tv.vendor_profile(), VendorProfile::Lg);
        // Only the second pass answers
        assert_eq!(f.adapter.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_pioneer_audio_system_vendor_commands_refused() {
        let f = fixture();
        f.registry.unregister_local(LogicalAddress::AudioSystem);
        let pioneer = VendorId::PIONEER.to_bytes();
        let audio = f.registry.device(LogicalAddress::AudioSystem).unwrap();
        audio.set_vendor_id(VendorId::PIONEER);

        let vendor = cmd(
            LogicalAddress::AudioSystem,
            LogicalAddress::Playback1,
            Opcode::VendorCommandWithId,
            &[pioneer[0], pioneer[1], pioneer[2], 0x10],
        );
        assert!(!f.dispatcher.handle_command(&vendor).await);
        let sent = f.adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].parameters[1], AbortReason::Refused.as_u8());
    }

    #[tokio::test]
    async fn test_set_stream_path_activates_local_device() {
        let f = fixture();
        let path = cmd(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::SetStreamPath, &[0x20, 0x00]);
        assert!(f.dispatcher.handle_command(&path).await);

        assert_eq!(f.registry.active_source(), Some(LogicalAddress::Playback1));
        let sent = f.adapter.sent();
        assert!(sent
            .iter()
            .any(|command| command.opcode == Some(Opcode::ActiveSource)
                && command.initiator == LogicalAddress::Playback1));
    }

    #[tokio::test]
    async fn test_user_control_power_toggle_deactivates() {
        let f = fixture();
        f.registry.mark_as_active_source(LogicalAddress::Playback1);
        let press = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::UserControlPressed,
            &[UserControlCode::Power.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&press).await);

        let playback = f.registry.device(LogicalAddress::Playback1).unwrap();
        assert!(!playback.is_active_source());
        assert_eq!(playback.menu_state(), MenuState::Deactivated);
        assert_eq!(playback.current_button(), Some(UserControlCode::Power));
        assert_eq!(f.adapter.sent()[0].opcode, Some(Opcode::InactiveSource));

        let release = cmd(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::UserControlRelease, &[]);
        assert!(f.dispatcher.handle_command(&release).await);
        assert_eq!(playback.current_button(), None);
    }

    #[tokio::test]
    async fn test_tv_keypress_marks_destination_active() {
        let f = fixture();
        let press = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::UserControlPressed,
            &[UserControlCode::Select.as_u8()],
        );
        assert!(f.dispatcher.handle_command(&press).await);
        assert_eq!(f.registry.active_source(), Some(LogicalAddress::Playback1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handled_response_completes_pending_transmit() {
        let f = fixture();
        let engine = f.dispatcher.engine().clone();
        let report = cmd(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
            Opcode::ReportPowerStatus,
            &[PowerStatus::On.as_u8()],
        );
        let responder = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.dispatcher.handle_command(&report).await
        };
        let (sent, handled) = tokio::join!(
            engine.transmit_request_power_status(LogicalAddress::Playback1, LogicalAddress::Tv, true),
            responder
        );
        assert!(sent);
        assert!(handled);
        assert_eq!(f.adapter.sent().len(), 1);
        assert_eq!(
            f.registry.device(LogicalAddress::Tv).unwrap().power_status(),
            PowerStatus::On
        );
    }

    #[tokio::test]
    async fn test_play_is_accepted() {
        let f = fixture();
        let play = cmd(LogicalAddress::Tv, LogicalAddress::Playback1, Opcode::Play, &[0x24]);
        assert!(f.dispatcher.handle_command(&play).await);
        assert!(f.adapter.sent().is_empty());
    }
}
