//! Bus devices
//!
//! One [`BusDevice`] exists per logical address. Its generic state lives
//! behind a per-device lock; audio systems and playback devices carry an
//! additional kind-specific state object reached through
//! [`BusDevice::as_audio_system`] and [`BusDevice::as_playback_device`].
//!
//! Locks are only held for the read/compare/write of a setter or while a
//! command is composed, never across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use cec_protocol::{
    CecVersion, DeviceType, LogicalAddress, MenuState, Opcode, PhysicalAddress, PowerStatus,
    UserControlCode, VendorId,
};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::active_source::ActiveSourceArbiter;
use crate::adapter::BusAdapter;
use crate::audio::{AudioSystem, AudioSystemState};
use crate::playback::{PlaybackDevice, PlaybackState};
use crate::transmit::TransmitEngine;
use crate::vendor::VendorProfile;

const OPCODE_SIGNAL_CAPACITY: usize = 32;

/// Whether a device is known to be on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceStatus {
    /// Not probed yet
    #[default]
    Unknown,
    /// Seen on the bus
    Present,
    /// Probed and absent
    NotPresent,
    /// Emulated by this process
    HandledLocally,
}

/// Generic per-device state
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub physical_address: PhysicalAddress,
    pub power_status: PowerStatus,
    pub vendor_id: VendorId,
    pub vendor_id_requested: bool,
    pub vendor_profile: VendorProfile,
    pub status: DeviceStatus,
    pub menu_state: MenuState,
    pub active_route: PhysicalAddress,
    pub active_source: bool,
    /// Set when the device announced itself as active source
    pub stream_path_response: Option<PhysicalAddress>,
    /// Set when the device reported routing information
    pub routing_information_response: Option<PhysicalAddress>,
    pub unsupported_features: HashSet<Opcode>,
    /// Last abort reason received per aborted opcode byte
    pub feature_abort_reasons: HashMap<u8, u8>,
    /// Packed `(initiator << 4) | destination` of the last standby
    pub standby_status: Option<u8>,
    pub cec_version: CecVersion,
    pub osd_name: String,
    pub menu_language: [u8; 3],
    pub current_button: Option<UserControlCode>,
    pub last_power_status_request: Option<Instant>,
}

impl DeviceState {
    fn new(address: LogicalAddress) -> Self {
        Self {
            physical_address: PhysicalAddress::INVALID,
            power_status: PowerStatus::Unknown,
            vendor_id: VendorId::UNKNOWN,
            vendor_id_requested: false,
            vendor_profile: VendorProfile::Generic,
            status: DeviceStatus::Unknown,
            menu_state: MenuState::Activated,
            active_route: PhysicalAddress::INVALID,
            active_source: false,
            stream_path_response: None,
            routing_information_response: None,
            unsupported_features: HashSet::new(),
            feature_abort_reasons: HashMap::new(),
            standby_status: None,
            cec_version: CecVersion::V1_4,
            osd_name: address.name().to_string(),
            menu_language: *b"eng",
            current_button: None,
            last_power_status_request: None,
        }
    }
}

/// Kind-specific state
#[derive(Debug)]
pub enum DeviceKind {
    Generic,
    Playback(Mutex<PlaybackState>),
    AudioSystem(Mutex<AudioSystemState>),
}

/// Copy of everything known about a device
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub address: LogicalAddress,
    pub device_type: DeviceType,
    pub state: DeviceState,
    pub audio: Option<AudioSystemState>,
    pub playback: Option<PlaybackState>,
}

/// A device at one logical address
#[derive(Debug)]
pub struct BusDevice {
    address: LogicalAddress,
    device_type: DeviceType,
    state: Mutex<DeviceState>,
    kind: DeviceKind,
    opcode_tx: broadcast::Sender<Opcode>,
    arbiter: ActiveSourceArbiter,
}

/// Device type implied by a logical address
pub fn device_type_for(address: LogicalAddress) -> DeviceType {
    match address {
        LogicalAddress::Tv => DeviceType::Tv,
        LogicalAddress::Recording1 | LogicalAddress::Recording2 | LogicalAddress::Recording3 => {
            DeviceType::RecordingDevice
        }
        LogicalAddress::Tuner1
        | LogicalAddress::Tuner2
        | LogicalAddress::Tuner3
        | LogicalAddress::Tuner4 => DeviceType::Tuner,
        LogicalAddress::Playback1 | LogicalAddress::Playback2 | LogicalAddress::Playback3 => {
            DeviceType::PlaybackDevice
        }
        LogicalAddress::AudioSystem => DeviceType::AudioSystem,
        _ => DeviceType::Reserved,
    }
}

pub(crate) fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BusDevice {
    /// Create the device for `address`, choosing its kind from the address
    pub fn new(address: LogicalAddress, active_source_retry: Duration) -> Self {
        let device_type = device_type_for(address);
        let kind = match device_type {
            DeviceType::AudioSystem => DeviceKind::AudioSystem(Mutex::new(AudioSystemState::new())),
            DeviceType::PlaybackDevice => DeviceKind::Playback(Mutex::new(PlaybackState::default())),
            _ => DeviceKind::Generic,
        };
        let (opcode_tx, _) = broadcast::channel(OPCODE_SIGNAL_CAPACITY);
        Self {
            address,
            device_type,
            state: Mutex::new(DeviceState::new(address)),
            kind,
            opcode_tx,
            arbiter: ActiveSourceArbiter::new(active_source_retry),
        }
    }

    pub fn logical_address(&self) -> LogicalAddress {
        self.address
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn kind(&self) -> &DeviceKind {
        &self.kind
    }

    pub fn arbiter(&self) -> &ActiveSourceArbiter {
        &self.arbiter
    }

    /// Audio system capability, if this device is one
    pub fn as_audio_system(&self) -> Option<AudioSystem<'_>> {
        match &self.kind {
            DeviceKind::AudioSystem(state) => Some(AudioSystem::new(self, state)),
            _ => None,
        }
    }

    /// Playback capability, if this device is one
    pub fn as_playback_device(&self) -> Option<PlaybackDevice<'_>> {
        match &self.kind {
            DeviceKind::Playback(state) => Some(PlaybackDevice::new(self, state)),
            _ => None,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DeviceState> {
        lock_recovering(&self.state)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            address: self.address,
            device_type: self.device_type,
            state: self.lock().clone(),
            audio: self.as_audio_system().map(|audio| audio.state()),
            playback: self.as_playback_device().map(|playback| playback.state()),
        }
    }

    // ------------------------------------------------------------------
    // Opcode signalling
    // ------------------------------------------------------------------

    /// Register interest in opcodes this device will signal
    pub fn subscribe_opcodes(&self) -> broadcast::Receiver<Opcode> {
        self.opcode_tx.subscribe()
    }

    /// Wake waiters expecting `opcode` from this device
    pub fn signal_opcode(&self, opcode: Opcode) {
        // No receivers simply means nobody is waiting
        let _ = self.opcode_tx.send(opcode);
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn physical_address(&self) -> PhysicalAddress {
        self.lock().physical_address
    }

    pub fn power_status(&self) -> PowerStatus {
        self.lock().power_status
    }

    pub fn vendor_id(&self) -> VendorId {
        self.lock().vendor_id
    }

    pub fn vendor_profile(&self) -> VendorProfile {
        self.lock().vendor_profile
    }

    pub fn status(&self) -> DeviceStatus {
        self.lock().status
    }

    pub fn is_handled_locally(&self) -> bool {
        self.status() == DeviceStatus::HandledLocally
    }

    pub fn menu_state(&self) -> MenuState {
        self.lock().menu_state
    }

    pub fn active_route(&self) -> PhysicalAddress {
        self.lock().active_route
    }

    pub fn is_active_source(&self) -> bool {
        self.lock().active_source
    }

    pub fn stream_path_response(&self) -> Option<PhysicalAddress> {
        self.lock().stream_path_response
    }

    pub fn routing_information_response(&self) -> Option<PhysicalAddress> {
        self.lock().routing_information_response
    }

    pub fn is_unsupported_feature(&self, opcode: Opcode) -> bool {
        self.lock().unsupported_features.contains(&opcode)
    }

    pub fn feature_abort_reason(&self, opcode: u8) -> Option<u8> {
        self.lock().feature_abort_reasons.get(&opcode).copied()
    }

    pub fn standby_status(&self) -> Option<u8> {
        self.lock().standby_status
    }

    pub fn cec_version(&self) -> CecVersion {
        self.lock().cec_version
    }

    pub fn osd_name(&self) -> String {
        self.lock().osd_name.clone()
    }

    pub fn menu_language(&self) -> [u8; 3] {
        self.lock().menu_language
    }

    pub fn current_button(&self) -> Option<UserControlCode> {
        self.lock().current_button
    }

    // ------------------------------------------------------------------
    // Setters: compare, write and log on change, report whether it changed
    // ------------------------------------------------------------------

    pub fn set_physical_address(&self, address: PhysicalAddress) -> bool {
        let mut state = self.lock();
        if state.physical_address == address {
            return false;
        }
        debug!(
            "{} ({}): physical address changed from {} to {}",
            self.address.name(),
            self.address.as_u8(),
            state.physical_address,
            address
        );
        state.physical_address = address;
        true
    }

    pub fn set_power_status(&self, status: PowerStatus) -> bool {
        let mut state = self.lock();
        if state.power_status == status {
            return false;
        }
        debug!(
            "{} ({}): power status changed from '{}' to '{}'",
            self.address.name(),
            self.address.as_u8(),
            state.power_status,
            status
        );
        state.power_status = status;
        true
    }

    /// Also selects the vendor profile for the new vendor
    pub fn set_vendor_id(&self, vendor: VendorId) -> bool {
        let mut state = self.lock();
        if state.vendor_id == vendor {
            return false;
        }
        debug!(
            "{} ({}): vendor = {}",
            self.address.name(),
            self.address.as_u8(),
            vendor
        );
        state.vendor_id = vendor;
        state.vendor_profile = VendorProfile::for_vendor(vendor);
        true
    }

    pub fn set_device_status(&self, status: DeviceStatus) -> bool {
        let mut state = self.lock();
        if state.status == status {
            return false;
        }
        debug!(
            "{} ({}): device status changed from {:?} to {:?}",
            self.address.name(),
            self.address.as_u8(),
            state.status,
            status
        );
        state.status = status;
        true
    }

    /// Record traffic from this device. Local devices keep their status.
    pub fn mark_present(&self) -> bool {
        let mut state = self.lock();
        match state.status {
            DeviceStatus::HandledLocally | DeviceStatus::Present => false,
            _ => {
                state.status = DeviceStatus::Present;
                true
            }
        }
    }

    pub fn set_menu_state(&self, menu_state: MenuState) -> bool {
        let mut state = self.lock();
        if state.menu_state == menu_state {
            return false;
        }
        debug!(
            "{} ({}): menu state set to '{}'",
            self.address.name(),
            self.address.as_u8(),
            menu_state
        );
        state.menu_state = menu_state;
        true
    }

    pub fn set_active_route(&self, route: PhysicalAddress) -> bool {
        let mut state = self.lock();
        if state.active_route == route {
            return false;
        }
        debug!(
            "{} ({}): active route set to {}",
            self.address.name(),
            self.address.as_u8(),
            route
        );
        state.active_route = route;
        true
    }

    pub fn set_stream_path_response(&self, address: PhysicalAddress) -> bool {
        let mut state = self.lock();
        if state.stream_path_response == Some(address) {
            return false;
        }
        state.stream_path_response = Some(address);
        true
    }

    pub fn set_routing_information_response(&self, address: PhysicalAddress) -> bool {
        let mut state = self.lock();
        if state.routing_information_response == Some(address) {
            return false;
        }
        state.routing_information_response = Some(address);
        true
    }

    pub fn set_unsupported_feature(&self, opcode: Opcode) -> bool {
        let inserted = self.lock().unsupported_features.insert(opcode);
        if inserted {
            debug!(
                "{} ({}): marking opcode '{}' as unsupported",
                self.address.name(),
                self.address.as_u8(),
                opcode
            );
        }
        inserted
    }

    pub fn set_feature_abort_status(&self, opcode: u8, reason: u8) -> bool {
        let previous = self.lock().feature_abort_reasons.insert(opcode, reason);
        previous != Some(reason)
    }

    pub fn set_standby_status(&self, packed: u8) -> bool {
        let mut state = self.lock();
        if state.standby_status == Some(packed) {
            return false;
        }
        debug!(
            "{} ({}): standby from {} to {}",
            self.address.name(),
            self.address.as_u8(),
            LogicalAddress::from_nibble(packed >> 4),
            LogicalAddress::from_nibble(packed)
        );
        state.standby_status = Some(packed);
        true
    }

    pub fn set_cec_version(&self, version: CecVersion) -> bool {
        let mut state = self.lock();
        if state.cec_version == version {
            return false;
        }
        debug!(
            "{} ({}): CEC version {}",
            self.address.name(),
            self.address.as_u8(),
            version
        );
        state.cec_version = version;
        true
    }

    pub fn set_osd_name(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        let mut state = self.lock();
        if state.osd_name == name {
            return false;
        }
        debug!(
            "{} ({}): osd name set to '{}'",
            self.address.name(),
            self.address.as_u8(),
            name
        );
        state.osd_name = name;
        true
    }

    pub fn set_menu_language(&self, language: [u8; 3]) -> bool {
        let mut state = self.lock();
        if state.menu_language == language {
            return false;
        }
        debug!(
            "{} ({}): menu language set to '{}'",
            self.address.name(),
            self.address.as_u8(),
            String::from_utf8_lossy(&language)
        );
        state.menu_language = language;
        true
    }

    pub fn set_current_button(&self, button: Option<UserControlCode>) {
        self.lock().current_button = button;
    }

    /// Flag only; use the registry to keep a single active source
    pub(crate) fn set_active_source_flag(&self, active: bool) -> bool {
        let mut state = self.lock();
        if state.active_source == active {
            return false;
        }
        debug!(
            "{} ({}): {} active source",
            self.address.name(),
            self.address.as_u8(),
            if active { "marking as" } else { "no longer" }
        );
        state.active_source = active;
        true
    }

    // ------------------------------------------------------------------
    // Bus operations
    // ------------------------------------------------------------------

    /// Bring this device out of standby on behalf of `initiator`
    pub async fn power_on<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> bool {
        debug!(
            "<< powering on '{}' ({})",
            self.address.name(),
            self.address.as_u8()
        );
        if self.address == LogicalAddress::Tv {
            return engine.transmit_image_view_on(initiator, self.address).await;
        }
        engine
            .transmit_keypress(initiator, self.address, UserControlCode::Power, false)
            .await
            && engine
                .transmit_key_release(initiator, self.address, false)
                .await
    }

    /// Broadcast that this device is the active source
    pub async fn transmit_active_source<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        is_reply: bool,
    ) -> bool {
        let (active, power, physical_address) = {
            let state = self.lock();
            (
                state.active_source,
                state.power_status,
                state.physical_address,
            )
        };
        if !active {
            debug!(
                "'{}' ({}) is not the active source",
                self.address.name(),
                self.address.as_u8()
            );
            return false;
        }
        if power != PowerStatus::On && power != PowerStatus::InTransitionStandbyToOn {
            debug!(
                "'{}' ({}) is not powered on ({}), announcing anyway",
                self.address.name(),
                self.address.as_u8(),
                power
            );
        }
        engine
            .transmit_active_source(self.address, physical_address, is_reply)
            .await
    }

    /// Tell the TV this device stopped being a source
    pub async fn transmit_inactive_source<A: BusAdapter>(&self, engine: &TransmitEngine<A>) -> bool {
        let physical_address = self.physical_address();
        engine
            .transmit_inactive_source(self.address, physical_address)
            .await
    }

    pub async fn transmit_menu_state<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let menu_state = self.menu_state();
        engine
            .transmit_menu_state(self.address, destination, menu_state, is_reply)
            .await
    }

    pub async fn transmit_power_state<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let power = self.power_status();
        engine
            .transmit_power_state(self.address, destination, power, is_reply)
            .await
    }

    pub async fn transmit_physical_address<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        is_reply: bool,
    ) -> bool {
        let physical_address = self.physical_address();
        if !physical_address.is_valid() {
            debug!(
                "'{}' ({}) has no physical address to report",
                self.address.name(),
                self.address.as_u8()
            );
            return false;
        }
        engine
            .transmit_physical_address(self.address, physical_address, self.device_type, is_reply)
            .await
    }

    pub async fn transmit_vendor_id<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let vendor = self.vendor_id();
        if !vendor.is_known() {
            debug!(
                "'{}' ({}) has no vendor id to report",
                self.address.name(),
                self.address.as_u8()
            );
            return false;
        }
        engine
            .transmit_vendor_id(self.address, destination, vendor, is_reply)
            .await
    }

    pub async fn transmit_osd_name<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let name = self.osd_name();
        engine
            .transmit_osd_name(self.address, destination, &name, is_reply)
            .await
    }

    pub async fn transmit_cec_version<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let version = self.cec_version();
        engine
            .transmit_cec_version(self.address, destination, version, is_reply)
            .await
    }

    pub async fn transmit_set_menu_language<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        is_reply: bool,
    ) -> bool {
        let language = self.menu_language();
        engine
            .transmit_set_menu_language(self.address, language, is_reply)
            .await
    }

    /// Ask this device for its power status
    ///
    /// Requests to the TV are skipped (reporting success) when one was sent
    /// within the configured refresh window, unless `force` is set.
    pub async fn request_power_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
        force: bool,
    ) -> bool {
        if self.is_handled_locally() || initiator == LogicalAddress::Unknown {
            return false;
        }
        if self.address == LogicalAddress::Tv {
            let now = Instant::now();
            let mut state = self.lock();
            if let Some(last) = state.last_power_status_request {
                if !force && now.duration_since(last) < engine.config().power_status_refresh() {
                    return true;
                }
            }
            state.last_power_status_request = Some(now);
        }
        engine
            .transmit_request_power_status(initiator, self.address, true)
            .await
    }

    /// Request the vendor id once per device
    pub async fn check_vendor_id_requested<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        initiator: LogicalAddress,
    ) -> bool {
        {
            let mut state = self.lock();
            if state.vendor_id_requested || state.status == DeviceStatus::HandledLocally {
                return false;
            }
            state.vendor_id_requested = true;
        }
        engine
            .transmit_request_vendor_id(initiator, self.address, false)
            .await
    }

    /// A poll from `initiator` was addressed to this device
    pub fn handle_poll(&self, initiator: LogicalAddress) {
        debug!(
            "<< POLL: {} ({}) -> {} ({})",
            initiator.name(),
            initiator.as_u8(),
            self.address.name(),
            self.address.as_u8()
        );
    }

    /// Mark this device as the active source and run the arbiter now, or
    /// after `delay` on the next retry check
    pub async fn activate_source<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        delay: Duration,
    ) -> bool {
        engine.registry().mark_as_active_source(self.address);
        if delay.is_zero() {
            self.arbiter.activate_source(self, engine, false).await
        } else {
            self.arbiter.schedule_activate_source(delay);
            true
        }
    }
}
