//! Transmit engine
//!
//! Sends commands through the [`BusAdapter`], refusing frames for devices
//! that are absent or emulated locally, skipping requests the destination is
//! known not to support, and waiting for the correlated response opcode.
//!
//! # Retry and wait
//!
//! ```text
//! attempt 1..=retries+1:
//!     subscribe to the waiting device's opcode signal
//!     physical send ── fail ──> next attempt
//!     no response expected ──> success
//!     wait(transmit_timeout) ── expected opcode ──> success
//!                            └─ timeout ──────────> next attempt
//! ```
//!
//! Attempts are strictly sequential.

use std::sync::Arc;

use cec_protocol::{
    AbortReason, AudioStatus, CecCommand, CecVersion, DeckInfo, DeviceType, LogicalAddress,
    MenuState, Opcode, PhysicalAddress, PowerStatus, ResponseTable, SystemAudioStatus,
    UserControlCode, VendorId,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::adapter::BusAdapter;
use crate::config::HandlerConfig;
use crate::device::DeviceStatus;
use crate::registry::DeviceRegistry;

/// Sends commands and correlates their responses
#[derive(Debug)]
pub struct TransmitEngine<A> {
    adapter: A,
    registry: Arc<DeviceRegistry>,
    config: HandlerConfig,
}

/// Wait until `expected` is signalled on `rx`, bounded by `limit`
async fn wait_for_opcode(
    rx: &mut broadcast::Receiver<Opcode>,
    expected: Opcode,
    limit: Duration,
) -> bool {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(opcode) if opcode == expected => return true,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return false,
            }
        }
    };
    timeout(limit, wait).await.unwrap_or(false)
}

impl<A: BusAdapter> TransmitEngine<A> {
    pub fn new(adapter: A, registry: Arc<DeviceRegistry>, config: HandlerConfig) -> Self {
        Self {
            adapter,
            registry,
            config,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Send `command`, waiting for the general-table response unless
    /// `suppress_wait` is set
    pub async fn transmit(&self, command: CecCommand, suppress_wait: bool, is_reply: bool) -> bool {
        self.transmit_correlated(ResponseTable::General, command, suppress_wait, is_reply)
            .await
    }

    /// Send a request the destination is expected to feature-abort
    pub async fn transmit_expecting_feature_abort(
        &self,
        command: CecCommand,
        suppress_wait: bool,
        is_reply: bool,
    ) -> bool {
        self.transmit_correlated(ResponseTable::FeatureAbort, command, suppress_wait, is_reply)
            .await
    }

    /// Send a standby that is answered by an echo of itself
    pub async fn transmit_expecting_standby_reply(
        &self,
        command: CecCommand,
        suppress_wait: bool,
        is_reply: bool,
    ) -> bool {
        self.transmit_correlated(ResponseTable::Standby, command, suppress_wait, is_reply)
            .await
    }

    async fn transmit_correlated(
        &self,
        table: ResponseTable,
        mut command: CecCommand,
        suppress_wait: bool,
        is_reply: bool,
    ) -> bool {
        if command.initiator == LogicalAddress::Unknown {
            warn!("not transmitting {}: initiator is unknown", command);
            return false;
        }

        let destination = command.destination;
        if let Some(opcode) = command.opcode {
            if !destination.is_broadcast() {
                let Some(device) = self.registry.device(destination) else {
                    debug!("not transmitting {}: no device at {}", command, destination);
                    return false;
                };
                match device.status() {
                    DeviceStatus::NotPresent => {
                        debug!(
                            "not sending command '{}': destination device '{}' marked as not present",
                            opcode,
                            destination.name()
                        );
                        return false;
                    }
                    DeviceStatus::HandledLocally => {
                        debug!(
                            "not sending command '{}': destination device '{}' is handled locally",
                            opcode,
                            destination.name()
                        );
                        return false;
                    }
                    DeviceStatus::Unknown | DeviceStatus::Present => {}
                }
                if table.honours_unsupported() && device.is_unsupported_feature(opcode) {
                    debug!(
                        "not sending command '{}': '{}' does not support it",
                        opcode,
                        destination.name()
                    );
                    return true;
                }
            }
        }

        let expected = command
            .opcode
            .and_then(|opcode| table.expected_response(opcode));
        let expected = expected.filter(|_| !suppress_wait);
        // Broadcast responses are signalled on every device, including 15
        let waiter = self.registry.device(destination);

        command.transmit_timeout = self.config.transmit_timeout();
        let attempts = u32::from(self.config.transmit_retries) + 1;

        for attempt in 1..=attempts {
            let mut rx = expected
                .and(waiter)
                .map(|device| device.subscribe_opcodes());

            debug!(
                "<< {} ({} table, attempt {}/{})",
                command,
                table.name(),
                attempt,
                attempts
            );
            if !self.adapter.transmit(&command, is_reply).await {
                debug!("transmit of {} failed on attempt {}", command, attempt);
                continue;
            }

            let (Some(expected), Some(rx)) = (expected, rx.as_mut()) else {
                return true;
            };
            if wait_for_opcode(rx, expected, command.transmit_timeout).await {
                debug!("expected response '{}' received for {}", expected, command);
                return true;
            }
            debug!(
                "expected response '{}' not received within {:?} for {}",
                expected, command.transmit_timeout, command
            );
        }
        false
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub async fn transmit_poll(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        self.transmit(CecCommand::poll(initiator, destination), false, is_reply)
            .await
    }

    /// Reply to `destination` that `opcode` was rejected
    pub async fn transmit_abort(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        opcode: Opcode,
        reason: AbortReason,
    ) -> bool {
        debug!(
            "<< {} -> {}: feature abort '{}' ({})",
            initiator, destination, opcode, reason
        );
        let command = CecCommand::new(initiator, destination, Opcode::FeatureAbort)
            .with_u8(opcode.as_u8())
            .with_u8(reason.as_u8());
        self.transmit(command, true, true).await
    }

    pub async fn transmit_keypress(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        key: UserControlCode,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::UserControlPressed)
            .with_u8(key.as_u8());
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_key_release(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::UserControlRelease);
        self.transmit(command, !wait, false).await
    }

    /// On success a destination that is not on moves to standby-to-on
    pub async fn transmit_image_view_on(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::ImageViewOn);
        if !self.transmit(command, false, false).await {
            return false;
        }
        if let Some(device) = self.registry.device(destination) {
            if device.power_status() != PowerStatus::On {
                device.set_power_status(PowerStatus::InTransitionStandbyToOn);
            }
        }
        true
    }

    pub async fn transmit_standby(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::Standby);
        self.transmit(command, false, false).await
    }

    pub async fn transmit_active_source(
        &self,
        initiator: LogicalAddress,
        physical_address: PhysicalAddress,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::ActiveSource)
            .with_physical_address(physical_address);
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_inactive_source(
        &self,
        initiator: LogicalAddress,
        physical_address: PhysicalAddress,
    ) -> bool {
        let command = CecCommand::new(initiator, LogicalAddress::Tv, Opcode::InactiveSource)
            .with_physical_address(physical_address);
        self.transmit(command, false, false).await
    }

    pub async fn transmit_menu_state(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        state: MenuState,
        is_reply: bool,
    ) -> bool {
        let command =
            CecCommand::new(initiator, destination, Opcode::MenuStatus).with_u8(state.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_power_state(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        status: PowerStatus,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::ReportPowerStatus)
            .with_u8(status.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_physical_address(
        &self,
        initiator: LogicalAddress,
        physical_address: PhysicalAddress,
        device_type: DeviceType,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(
            initiator,
            LogicalAddress::Broadcast,
            Opcode::ReportPhysicalAddress,
        )
        .with_physical_address(physical_address)
        .with_u8(device_type.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_vendor_id(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        vendor: VendorId,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::DeviceVendorId)
            .with_bytes(&vendor.to_bytes());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_osd_name(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        name: &str,
        is_reply: bool,
    ) -> bool {
        let bytes: Vec<u8> = name
            .bytes()
            .take(cec_protocol::MAX_PARAMETERS)
            .collect();
        let command =
            CecCommand::new(initiator, destination, Opcode::SetOsdName).with_bytes(&bytes);
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_cec_version(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        version: CecVersion,
        is_reply: bool,
    ) -> bool {
        let command =
            CecCommand::new(initiator, destination, Opcode::CecVersion).with_u8(version.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_set_menu_language(
        &self,
        initiator: LogicalAddress,
        language: [u8; 3],
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::SetMenuLanguage)
            .with_bytes(&language);
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_deck_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        status: DeckInfo,
        is_reply: bool,
    ) -> bool {
        let command =
            CecCommand::new(initiator, destination, Opcode::DeckStatus).with_u8(status.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_audio_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        status: AudioStatus,
        is_reply: bool,
    ) -> bool {
        let command =
            CecCommand::new(initiator, destination, Opcode::ReportAudioStatus).with_u8(status.0);
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_set_system_audio_mode(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        mode: SystemAudioStatus,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::SetSystemAudioMode)
            .with_u8(mode.as_u8());
        self.transmit(command, false, is_reply).await
    }

    pub async fn transmit_system_audio_mode_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        mode: SystemAudioStatus,
        is_reply: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::SystemAudioModeStatus)
            .with_u8(mode.as_u8());
        self.transmit(command, false, is_reply).await
    }

    /// An invalid `physical_address` sends the request without operands
    pub async fn transmit_system_audio_mode_request(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        physical_address: PhysicalAddress,
        wait: bool,
    ) -> bool {
        let mut command = CecCommand::new(initiator, destination, Opcode::SystemAudioModeRequest);
        if physical_address.is_valid() {
            command = command.with_physical_address(physical_address);
        }
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_arc_start_end(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        start: bool,
        wait: bool,
    ) -> bool {
        let opcode = if start {
            Opcode::StartArc
        } else {
            Opcode::EndArc
        };
        self.transmit(CecCommand::new(initiator, destination, opcode), !wait, false)
            .await
    }

    /// `extra` is appended as-is; well-formed requests carry none
    pub async fn transmit_request_arc_start_end(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        start: bool,
        extra: &[u8],
        wait: bool,
    ) -> bool {
        let opcode = if start {
            Opcode::RequestArcStart
        } else {
            Opcode::RequestArcEnd
        };
        let command = CecCommand::new(initiator, destination, opcode).with_bytes(extra);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_report_arc_started_ended(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        started: bool,
        wait: bool,
    ) -> bool {
        let opcode = if started {
            Opcode::ReportArcStarted
        } else {
            Opcode::ReportArcEnded
        };
        self.transmit(CecCommand::new(initiator, destination, opcode), !wait, false)
            .await
    }

    pub async fn transmit_request_short_audio_descriptor(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        format_codes: &[u8],
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::RequestShortAudioDescriptor)
            .with_bytes(format_codes);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_request_power_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::GiveDevicePowerStatus);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_request_vendor_id(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::GiveDeviceVendorId);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_request_audio_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::GiveAudioStatus);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_request_system_audio_mode_status(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        wait: bool,
    ) -> bool {
        let command = CecCommand::new(initiator, destination, Opcode::GiveSystemAudioModeStatus);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_request_active_source(&self, initiator: LogicalAddress, wait: bool) -> bool {
        let command =
            CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::RequestActiveSource);
        self.transmit(command, !wait, false).await
    }

    pub async fn transmit_set_stream_path(
        &self,
        initiator: LogicalAddress,
        physical_address: PhysicalAddress,
    ) -> bool {
        let command = CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::SetStreamPath)
            .with_physical_address(physical_address);
        self.transmit(command, false, false).await
    }

    pub async fn transmit_routing_change(
        &self,
        initiator: LogicalAddress,
        from: PhysicalAddress,
        to: PhysicalAddress,
    ) -> bool {
        let command = CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::RoutingChange)
            .with_physical_address(from)
            .with_physical_address(to);
        self.transmit(command, false, false).await
    }

    pub async fn transmit_routing_information(
        &self,
        initiator: LogicalAddress,
        physical_address: PhysicalAddress,
    ) -> bool {
        let command =
            CecCommand::new(initiator, LogicalAddress::Broadcast, Opcode::RoutingInformation)
                .with_physical_address(physical_address);
        self.transmit(command, false, false).await
    }

    /// Send an opcode the destination is expected to reject
    pub async fn transmit_request_unsupported_opcode(
        &self,
        initiator: LogicalAddress,
        destination: LogicalAddress,
        opcode: Opcode,
        operands: &[u8],
    ) -> bool {
        let command = CecCommand::new(initiator, destination, opcode).with_bytes(operands);
        self.transmit_expecting_feature_abort(command, false, false)
            .await
    }

    /// Send standby and wait for it to be echoed
    ///
    /// `packed` carries `(initiator << 4) | destination`.
    pub async fn transmit_request_standby(&self, packed: u8) -> bool {
        let initiator = LogicalAddress::from_nibble(packed >> 4);
        let destination = LogicalAddress::from_nibble(packed);
        let command = CecCommand::new(initiator, destination, Opcode::Standby);
        self.transmit_expecting_standby_reply(command, false, false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine_with, RecordingAdapter};

    fn setup() -> (
        Arc<DeviceRegistry>,
        TransmitEngine<Arc<RecordingAdapter>>,
        Arc<RecordingAdapter>,
    ) {
        let registry = Arc::new(DeviceRegistry::new(&HandlerConfig::default()));
        let adapter = Arc::new(RecordingAdapter::new());
        let engine = engine_with(registry.clone(), adapter.clone());
        (registry, engine, adapter)
    }

    #[tokio::test]
    async fn test_unknown_initiator_is_rejected() {
        let (_, engine, adapter) = setup();
        let command = CecCommand::new(
            LogicalAddress::Unknown,
            LogicalAddress::Tv,
            Opcode::GiveDevicePowerStatus,
        );
        assert!(!engine.transmit(command, false, false).await);
        assert_eq!(adapter.attempts(), 0);
    }

    #[tokio::test]
    async fn test_routing_and_poll_frames() {
        let (_, engine, adapter) = setup();
        let playback = LogicalAddress::Playback1;

        assert!(engine.transmit_poll(playback, LogicalAddress::Tv, false).await);
        assert!(engine.transmit_request_active_source(playback, false).await);
        assert!(
            engine
                .transmit_set_stream_path(LogicalAddress::Tv, PhysicalAddress(0x2000))
                .await
        );
        assert!(
            engine
                .transmit_routing_change(
                    LogicalAddress::Tv,
                    PhysicalAddress(0x1000),
                    PhysicalAddress(0x2000)
                )
                .await
        );
        assert!(
            engine
                .transmit_routing_information(LogicalAddress::Tv, PhysicalAddress(0x2100))
                .await
        );

        let frames: Vec<Vec<u8>> = adapter.sent().iter().map(|c| c.encode().unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                vec![0x40],
                vec![0x4F, 0x85],
                vec![0x0F, 0x86, 0x20, 0x00],
                vec![0x0F, 0x80, 0x10, 0x00, 0x20, 0x00],
                vec![0x0F, 0x81, 0x21, 0x00],
            ]
        );
    }

    #[tokio::test]
    async fn test_not_present_and_local_destinations_refused() {
        let (registry, engine, adapter) = setup();
        registry
            .device(LogicalAddress::Tv)
            .unwrap()
            .set_device_status(DeviceStatus::NotPresent);
        registry.register_local(LogicalAddress::Playback1, PhysicalAddress(0x1000));

        assert!(
            !engine
                .transmit_standby(LogicalAddress::AudioSystem, LogicalAddress::Tv)
                .await
        );
        assert!(
            !engine
                .transmit_standby(LogicalAddress::AudioSystem, LogicalAddress::Playback1)
                .await
        );
        assert_eq!(adapter.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_opcode_short_circuits() {
        let (registry, engine, adapter) = setup();
        registry
            .device(LogicalAddress::AudioSystem)
            .unwrap()
            .set_unsupported_feature(Opcode::GiveAudioStatus);

        assert!(
            engine
                .transmit_request_audio_status(
                    LogicalAddress::Tv,
                    LogicalAddress::AudioSystem,
                    true
                )
                .await
        );
        assert_eq!(adapter.attempts(), 0);
    }

    #[tokio::test]
    async fn test_feature_abort_variant_ignores_unsupported_set() {
        let (registry, engine, adapter) = setup();
        registry
            .device(LogicalAddress::AudioSystem)
            .unwrap()
            .set_unsupported_feature(Opcode::SetOsdString);
        adapter.answer_requests(registry.clone());

        assert!(
            engine
                .transmit_request_unsupported_opcode(
                    LogicalAddress::Tv,
                    LogicalAddress::AudioSystem,
                    Opcode::SetOsdString,
                    &[0x00],
                )
                .await
        );
        assert_eq!(adapter.attempts(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_skips_presence_gating() {
        let (registry, engine, adapter) = setup();
        registry
            .device(LogicalAddress::Broadcast)
            .unwrap()
            .set_device_status(DeviceStatus::NotPresent);
        assert!(
            engine
                .transmit_active_source(LogicalAddress::Playback1, PhysicalAddress(0x1000), false)
                .await
        );
        assert_eq!(adapter.sent()[0].encode().unwrap(), vec![0x4F, 0x82, 0x10, 0x00]);
    }

    #[tokio::test]
    async fn test_send_failure_retries_then_gives_up() {
        let (_, engine, adapter) = setup();
        adapter.fail_next(5);
        assert!(
            !engine
                .transmit_standby(LogicalAddress::Playback1, LogicalAddress::Tv)
                .await
        );
        assert_eq!(adapter.attempts(), 2);
    }

    #[tokio::test]
    async fn test_send_failure_then_success() {
        let (_, engine, adapter) = setup();
        adapter.fail_next(1);
        assert!(
            engine
                .transmit_standby(LogicalAddress::Playback1, LogicalAddress::Tv)
                .await
        );
        assert_eq!(adapter.attempts(), 2);
        assert_eq!(adapter.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout_retries_whole_send() {
        let (_, engine, adapter) = setup();
        let started = tokio::time::Instant::now();
        assert!(
            !engine
                .transmit_request_power_status(LogicalAddress::Playback1, LogicalAddress::Tv, true)
                .await
        );
        assert_eq!(adapter.sent().len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_wait_returns_after_send() {
        let (_, engine, adapter) = setup();
        assert!(
            engine
                .transmit_request_power_status(LogicalAddress::Playback1, LogicalAddress::Tv, false)
                .await
        );
        assert_eq!(adapter.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_signalled_during_wait() {
        let (registry, engine, adapter) = setup();
        let tv_registry = registry.clone();
        let responder = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tv_registry
                .device(LogicalAddress::Tv)
                .unwrap()
                .signal_opcode(Opcode::ReportPowerStatus);
        };
        let (ok, _) = tokio::join!(
            engine.transmit_request_power_status(LogicalAddress::Playback1, LogicalAddress::Tv, true),
            responder
        );
        assert!(ok);
        assert_eq!(adapter.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_signal_does_not_satisfy_wait() {
        let (registry, engine, adapter) = setup();
        let tv_registry = registry.clone();
        let responder = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tv_registry
                .device(LogicalAddress::Tv)
                .unwrap()
                .signal_opcode(Opcode::SetOsdName);
        };
        let (ok, _) = tokio::join!(
            engine.transmit_request_power_status(LogicalAddress::Playback1, LogicalAddress::Tv, true),
            responder
        );
        assert!(!ok);
        assert_eq!(adapter.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_image_view_on_moves_tv_towards_on() {
        let (registry, engine, _) = setup();
        let tv = registry.device(LogicalAddress::Tv).unwrap();
        tv.set_power_status(PowerStatus::Standby);

        assert!(
            engine
                .transmit_image_view_on(LogicalAddress::Playback1, LogicalAddress::Tv)
                .await
        );
        assert_eq!(tv.power_status(), PowerStatus::InTransitionStandbyToOn);
    }

    #[tokio::test]
    async fn test_request_standby_unpacks_addresses() {
        let (registry, engine, adapter) = setup();
        adapter.answer_requests(registry.clone());
        assert!(engine.transmit_request_standby(0x40).await);
        let sent = adapter.sent();
        assert_eq!(sent[0].initiator, LogicalAddress::Playback1);
        assert_eq!(sent[0].destination, LogicalAddress::Tv);
        assert_eq!(sent[0].opcode, Some(Opcode::Standby));
    }

    #[tokio::test]
    async fn test_feature_abort_frame() {
        let (_, engine, adapter) = setup();
        assert!(
            engine
                .transmit_abort(
                    LogicalAddress::AudioSystem,
                    LogicalAddress::Tv,
                    Opcode::GiveDeckStatus,
                    AbortReason::InvalidOperand,
                )
                .await
        );
        assert_eq!(adapter.sent()[0].encode().unwrap(), vec![0x50, 0x00, 0x1A, 0x03]);
    }
}
