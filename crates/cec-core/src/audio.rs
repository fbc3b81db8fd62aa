//! Audio system state machine
//!
//! Tracks system audio mode, volume, the audio return channel and the last
//! short audio descriptor for a device at the audio system address. The same
//! state serves two roles: when the audio system is remote, the request
//! operations query it and the dispatcher records its answers; when it is
//! emulated locally, the transmit operations answer on its behalf.
//!
//! Request operations reset the queried value to its unknown form before
//! sending, so a read made before the answer arrives never sees a stale
//! value.

use std::sync::Mutex;

use cec_protocol::{
    ArcStatus, AudioStatus, LogicalAddress, Opcode, PhysicalAddress, ShortAudioDescriptor,
    SystemAudioStatus, UserControlCode,
};
use tracing::{debug, info};

use crate::adapter::BusAdapter;
use crate::device::{lock_recovering, BusDevice, DeviceStatus};
use crate::transmit::TransmitEngine;

/// State owned by an audio system device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSystemState {
    system_audio_status: SystemAudioStatus,
    arc_status: ArcStatus,
    audio_status: AudioStatus,
    audio_descriptor: ShortAudioDescriptor,
    arc_started: bool,
}

impl AudioSystemState {
    pub fn new() -> Self {
        Self {
            system_audio_status: SystemAudioStatus::On,
            arc_status: ArcStatus::Unknown,
            audio_status: AudioStatus::UNKNOWN,
            audio_descriptor: ShortAudioDescriptor::UNKNOWN,
            arc_started: false,
        }
    }

    pub fn system_audio_status(&self) -> SystemAudioStatus {
        self.system_audio_status
    }

    pub fn arc_status(&self) -> ArcStatus {
        self.arc_status
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.audio_status
    }

    pub fn audio_descriptor(&self) -> ShortAudioDescriptor {
        self.audio_descriptor
    }

    pub fn arc_started(&self) -> bool {
        self.arc_started
    }

    /// Apply the ARC rule before a system audio mode is reported: while the
    /// return channel is up the device reports itself on and audible.
    fn force_for_arc(&mut self) {
        if self.arc_started {
            self.audio_status = AudioStatus::ARC_FORCED;
            self.system_audio_status = SystemAudioStatus::On;
        }
    }
}

impl Default for AudioSystemState {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio system view of a [`BusDevice`]
#[derive(Debug, Clone, Copy)]
pub struct AudioSystem<'a> {
    device: &'a BusDevice,
    state: &'a Mutex<AudioSystemState>,
}

impl<'a> AudioSystem<'a> {
    pub(crate) fn new(device: &'a BusDevice, state: &'a Mutex<AudioSystemState>) -> Self {
        Self { device, state }
    }

    pub fn device(&self) -> &'a BusDevice {
        self.device
    }

    pub fn logical_address(&self) -> LogicalAddress {
        self.device.logical_address()
    }

    /// Copy of the current state
    pub fn state(&self) -> AudioSystemState {
        lock_recovering(self.state).clone()
    }

    pub fn audio_status(&self) -> AudioStatus {
        lock_recovering(self.state).audio_status
    }

    pub fn system_audio_status(&self) -> SystemAudioStatus {
        lock_recovering(self.state).system_audio_status
    }

    pub fn arc_status(&self) -> ArcStatus {
        lock_recovering(self.state).arc_status
    }

    pub fn short_audio_descriptor(&self) -> ShortAudioDescriptor {
        lock_recovering(self.state).audio_descriptor
    }

    pub fn arc_started(&self) -> bool {
        lock_recovering(self.state).arc_started
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    pub fn set_audio_status(&self, status: AudioStatus) -> bool {
        let mut state = lock_recovering(self.state);
        if state.audio_status == status {
            return false;
        }
        debug!(
            "{} ({}): audio status changed from {} to {}",
            self.device.logical_address().name(),
            self.device.logical_address().as_u8(),
            state.audio_status,
            status
        );
        state.audio_status = status;
        true
    }

    pub fn set_system_audio_mode_status(&self, mode: SystemAudioStatus) -> bool {
        let mut state = lock_recovering(self.state);
        if state.system_audio_status == mode {
            return false;
        }
        debug!(
            "{} ({}): system audio mode status changed from {} to {}",
            self.device.logical_address().name(),
            self.device.logical_address().as_u8(),
            state.system_audio_status,
            mode
        );
        state.system_audio_status = mode;
        true
    }

    pub fn set_arc_status(&self, status: ArcStatus) -> bool {
        let mut state = lock_recovering(self.state);
        if state.arc_status == status {
            return false;
        }
        debug!(
            "{} ({}): ARC status changed from {} to {}",
            self.device.logical_address().name(),
            self.device.logical_address().as_u8(),
            state.arc_status,
            status
        );
        state.arc_status = status;
        true
    }

    pub fn set_short_audio_descriptor(&self, descriptor: ShortAudioDescriptor) -> bool {
        let mut state = lock_recovering(self.state);
        if state.audio_descriptor == descriptor {
            return false;
        }
        debug!(
            "{} ({}): audio descriptor changed from {} to {}",
            self.device.logical_address().name(),
            self.device.logical_address().as_u8(),
            state.audio_descriptor,
            descriptor
        );
        state.audio_descriptor = descriptor;
        true
    }

    // ------------------------------------------------------------------
    // Replies sent on behalf of an emulated audio system
    // ------------------------------------------------------------------

    pub async fn transmit_audio_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let status = self.audio_status();
        engine
            .transmit_audio_status(self.logical_address(), destination, status, is_reply)
            .await
    }

    pub async fn transmit_set_system_audio_mode<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let mode = {
            let mut state = lock_recovering(self.state);
            state.force_for_arc();
            state.system_audio_status
        };
        engine
            .transmit_set_system_audio_mode(self.logical_address(), destination, mode, is_reply)
            .await
    }

    pub async fn transmit_system_audio_mode_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let mode = {
            let mut state = lock_recovering(self.state);
            state.force_for_arc();
            state.system_audio_status
        };
        engine
            .transmit_system_audio_mode_status(self.logical_address(), destination, mode, is_reply)
            .await
    }

    /// Start or end the return channel towards `destination`
    ///
    /// `arc_started` is updated before the send and is not rolled back if
    /// the send fails.
    pub async fn transmit_arc_start_end<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        start: bool,
    ) -> bool {
        lock_recovering(self.state).arc_started = start;
        engine
            .transmit_arc_start_end(self.logical_address(), destination, start, true)
            .await
    }

    // ------------------------------------------------------------------
    // Requests to a remote audio system
    // ------------------------------------------------------------------

    fn can_request(&self, initiator: LogicalAddress) -> bool {
        initiator != LogicalAddress::Unknown && !self.device.is_handled_locally()
    }

    /// Ask for the audio status, returning the value known now
    pub async fn get_audio_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        update: bool,
    ) -> AudioStatus {
        let present = self.device.status() == DeviceStatus::Present;
        if present && (update || self.audio_status().is_unknown()) {
            self.device.check_vendor_id_requested(engine, initiator).await;
            self.request_audio_status(engine, initiator, true).await;
        }
        self.audio_status()
    }

    pub async fn request_audio_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        wait_for_response: bool,
    ) -> bool {
        if !self.can_request(initiator) || self.device.is_unsupported_feature(Opcode::GiveAudioStatus)
        {
            return false;
        }
        debug!(
            "<< requesting audio status of '{}' ({})",
            self.logical_address().name(),
            self.logical_address().as_u8()
        );
        engine
            .transmit_request_audio_status(initiator, self.logical_address(), wait_for_response)
            .await
    }

    /// Reset the system audio mode to unknown and ask for it
    ///
    /// The request is not awaited: the returned value is the state right
    /// after sending, which is `Unknown` until the answer is dispatched.
    pub async fn get_system_audio_mode_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        update: bool,
    ) -> SystemAudioStatus {
        self.set_system_audio_mode_status(SystemAudioStatus::Unknown);
        if update || self.device.status() != DeviceStatus::NotPresent {
            self.request_system_audio_mode_status(engine, initiator, false)
                .await;
        }
        self.system_audio_status()
    }

    pub async fn request_system_audio_mode_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        wait_for_response: bool,
    ) -> bool {
        if !self.can_request(initiator) {
            return false;
        }
        debug!(
            "<< requesting system audio mode status of '{}' ({})",
            self.logical_address().name(),
            self.logical_address().as_u8()
        );
        engine
            .transmit_request_system_audio_mode_status(
                initiator,
                self.logical_address(),
                wait_for_response,
            )
            .await
    }

    /// Reset the descriptor and ask for the one matching `format_code`
    pub async fn request_short_audio_descriptor<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        format_code: u8,
    ) -> ShortAudioDescriptor {
        self.set_short_audio_descriptor(ShortAudioDescriptor::UNKNOWN);
        if self.can_request(initiator) {
            engine
                .transmit_request_short_audio_descriptor(
                    initiator,
                    self.logical_address(),
                    &[format_code],
                    false,
                )
                .await;
        }
        self.short_audio_descriptor()
    }

    /// Send a system audio mode request, optionally carrying a source address
    pub async fn probe_system_audio_mode_request<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        physical_address: Option<PhysicalAddress>,
    ) -> SystemAudioStatus {
        self.set_system_audio_mode_status(SystemAudioStatus::Unknown);
        if self.can_request(initiator) {
            engine
                .transmit_system_audio_mode_request(
                    initiator,
                    self.logical_address(),
                    physical_address.unwrap_or(PhysicalAddress::INVALID),
                    false,
                )
                .await;
        }
        self.system_audio_status()
    }

    pub async fn request_arc_initiation<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> ArcStatus {
        self.request_arc(engine, initiator, true, None).await
    }

    pub async fn request_arc_termination<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> ArcStatus {
        self.request_arc(engine, initiator, false, None).await
    }

    /// Request ARC initiation with two operand bytes the opcode does not take
    pub async fn request_arc_initiation_with_operand<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        operand: [u8; 2],
    ) -> ArcStatus {
        self.request_arc(engine, initiator, true, Some(operand)).await
    }

    async fn request_arc<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        start: bool,
        extra: Option<[u8; 2]>,
    ) -> ArcStatus {
        self.set_arc_status(ArcStatus::Unknown);
        if self.can_request(initiator) {
            engine
                .transmit_request_arc_start_end(
                    initiator,
                    self.logical_address(),
                    start,
                    extra.as_ref().map(|bytes| &bytes[..]).unwrap_or(&[]),
                    false,
                )
                .await;
        }
        self.arc_status()
    }

    pub async fn report_arc_initiated<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> bool {
        if !self.can_request(initiator) {
            return false;
        }
        engine
            .transmit_report_arc_started_ended(initiator, self.logical_address(), true, false)
            .await
    }

    pub async fn report_arc_terminated<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> bool {
        if !self.can_request(initiator) {
            return false;
        }
        engine
            .transmit_report_arc_started_ended(initiator, self.logical_address(), false, false)
            .await
    }

    // ------------------------------------------------------------------
    // Volume keys
    // ------------------------------------------------------------------

    pub async fn volume_up<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        source: LogicalAddress,
        send_release: bool,
    ) -> AudioStatus {
        self.press_key(engine, source, UserControlCode::VolumeUp, send_release)
            .await;
        self.audio_status()
    }

    pub async fn volume_down<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        source: LogicalAddress,
        send_release: bool,
    ) -> AudioStatus {
        self.press_key(engine, source, UserControlCode::VolumeDown, send_release)
            .await;
        self.audio_status()
    }

    /// Toggle mute and request the resulting status
    pub async fn mute_audio<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        source: LogicalAddress,
    ) -> AudioStatus {
        self.press_key(engine, source, UserControlCode::Mute, true)
            .await;
        self.get_audio_status(engine, source, true).await
    }

    async fn press_key<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        source: LogicalAddress,
        key: UserControlCode,
        send_release: bool,
    ) -> bool {
        if !self.can_request(source) {
            return false;
        }
        let pressed = engine
            .transmit_keypress(source, self.logical_address(), key, false)
            .await;
        if pressed && send_release {
            return engine
                .transmit_key_release(source, self.logical_address(), false)
                .await;
        }
        pressed
    }

    /// Ask the audio system to take over audio for `source`
    pub async fn enable_audio<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        source: Option<&BusDevice>,
    ) -> bool {
        let physical_address = source
            .map(|device| device.physical_address())
            .unwrap_or(PhysicalAddress::INVALID);
        info!(
            "<< requesting system audio for {}",
            if physical_address.is_valid() {
                physical_address.to_string()
            } else {
                "no source".to_string()
            }
        );
        engine
            .transmit_system_audio_mode_request(
                initiator,
                self.logical_address(),
                physical_address,
                true,
            )
            .await
    }
}
