//! Processor facade
//!
//! Wires the registry, transmit engine and dispatcher together for one bus
//! adapter. The actor drives it; tests and tools can also use it directly.

use std::sync::Arc;

use cec_protocol::{CecCommand, LogicalAddress, PhysicalAddress};
use tokio::time::Duration;
use tracing::{debug, info};

use crate::adapter::BusAdapter;
use crate::audio::AudioSystem;
use crate::config::HandlerConfig;
use crate::device::{BusDevice, DeviceSnapshot};
use crate::diagnostics::UnmappedCommandLog;
use crate::dispatch::CommandDispatcher;
use crate::error::CecError;
use crate::registry::DeviceRegistry;
use crate::transmit::TransmitEngine;

pub struct CecProcessor<A> {
    registry: Arc<DeviceRegistry>,
    engine: Arc<TransmitEngine<A>>,
    dispatcher: CommandDispatcher<A>,
}

impl<A: BusAdapter> CecProcessor<A> {
    pub fn new(adapter: A, config: HandlerConfig) -> Result<Self, CecError> {
        config.validate()?;
        let registry = Arc::new(DeviceRegistry::new(&config));
        let engine = Arc::new(TransmitEngine::new(adapter, registry.clone(), config));
        let dispatcher = CommandDispatcher::new(engine.clone());
        Ok(Self {
            registry,
            engine,
            dispatcher,
        })
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &TransmitEngine<A> {
        &self.engine
    }

    pub fn config(&self) -> &HandlerConfig {
        self.engine.config()
    }

    pub fn unmapped_commands(&self) -> UnmappedCommandLog {
        self.dispatcher.unmapped_commands()
    }

    /// Emulate a device at `address`
    pub fn add_local_device(
        &self,
        address: LogicalAddress,
        physical_address: PhysicalAddress,
        osd_name: &str,
    ) -> Result<(), CecError> {
        if !address.is_device() {
            return Err(CecError::DeviceNotFound(address));
        }
        let device = self
            .registry
            .register_local(address, physical_address)
            .ok_or(CecError::DeviceNotFound(address))?;
        device.set_osd_name(osd_name);
        info!(
            "emulating '{}' as {} ({}) at {}",
            osd_name,
            address.name(),
            address.as_u8(),
            physical_address
        );
        Ok(())
    }

    /// Local devices only answer requests once initialised
    pub fn set_initialised(&self, initialised: bool) {
        self.registry.set_initialised(initialised);
    }

    pub fn device(&self, address: LogicalAddress) -> Result<&BusDevice, CecError> {
        self.registry
            .device(address)
            .ok_or(CecError::DeviceNotFound(address))
    }

    pub fn audio_system(&self, address: LogicalAddress) -> Result<AudioSystem<'_>, CecError> {
        self.device(address)?
            .as_audio_system()
            .ok_or(CecError::NotAnAudioSystem(address))
    }

    pub fn snapshot(&self, address: LogicalAddress) -> Result<DeviceSnapshot, CecError> {
        Ok(self.device(address)?.snapshot())
    }

    /// Decode a raw frame and dispatch it
    pub async fn on_frame(&self, frame: &[u8]) -> Result<bool, CecError> {
        let command = CecCommand::decode(frame)?;
        Ok(self.handle_command(&command).await)
    }

    pub async fn handle_command(&self, command: &CecCommand) -> bool {
        debug!(">> {}", command);
        self.dispatcher.handle_command(command).await
    }

    pub async fn transmit(&self, command: CecCommand) -> bool {
        self.engine.transmit(command, false, false).await
    }

    /// Make the local device at `address` the active source
    pub async fn activate_source(
        &self,
        address: LogicalAddress,
        delay: Duration,
    ) -> Result<bool, CecError> {
        let device = self.device(address)?;
        if !device.is_handled_locally() {
            return Err(CecError::DeviceNotFound(address));
        }
        Ok(device.activate_source(&self.engine, delay).await)
    }

    /// Retry every due active source activation; returns the devices that
    /// became active
    pub async fn process_pending_active_source(&self) -> Vec<LogicalAddress> {
        let mut activated = Vec::new();
        for device in self.registry.local_devices() {
            if device
                .arbiter()
                .activate_source(device, &self.engine, true)
                .await
            {
                activated.push(device.logical_address());
            }
        }
        activated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAdapter;
    use cec_protocol::{Opcode, ParseError};

    fn processor() -> CecProcessor<Arc<RecordingAdapter>> {
        let processor =
            CecProcessor::new(Arc::new(RecordingAdapter::new()), HandlerConfig::default()).unwrap();
        processor
            .add_local_device(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), "Soundbar")
            .unwrap();
        processor.set_initialised(true);
        processor
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HandlerConfig {
            transmit_timeout_ms: 0,
            ..HandlerConfig::default()
        };
        assert!(matches!(
            CecProcessor::new(Arc::new(RecordingAdapter::new()), config),
            Err(CecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_local_device_registration() {
        let processor = processor();
        let device = processor.device(LogicalAddress::AudioSystem).unwrap();
        assert!(device.is_handled_locally());
        assert_eq!(device.osd_name(), "Soundbar");
        assert!(processor.audio_system(LogicalAddress::AudioSystem).is_ok());
        assert!(matches!(
            processor.audio_system(LogicalAddress::Tv),
            Err(CecError::NotAnAudioSystem(LogicalAddress::Tv))
        ));
        assert!(matches!(
            processor.add_local_device(LogicalAddress::Broadcast, PhysicalAddress::ROOT, "x"),
            Err(CecError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_on_frame_decodes_and_dispatches() {
        let processor = processor();
        assert!(processor.on_frame(&[0x50, 0xC0]).await.unwrap());
        assert!(matches!(
            processor.on_frame(&[]).await,
            Err(CecError::Parse(ParseError::Incomplete { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cec2_opcodes_are_feature_aborted() {
        let processor = processor();
        // Give Features, Set Audio Volume Level, Request Current Latency
        for opcode in [0xA5, 0x73, 0xA7] {
            assert!(!processor.on_frame(&[0x05, opcode]).await.unwrap());
        }
        let sent = processor.engine().adapter().sent();
        let frames: Vec<Vec<u8>> = sent.iter().map(|c| c.encode().unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                vec![0x50, 0x00, 0xA5, 0x00],
                vec![0x50, 0x00, 0x73, 0x00],
                vec![0x50, 0x00, 0xA7, 0x00],
            ]
        );
    }

    #[tokio::test]
    async fn test_give_system_audio_mode_status_reply() {
        let processor = processor();
        assert!(processor.on_frame(&[0x05, 0x7D]).await.unwrap());
        let sent = processor.engine().adapter().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, Some(Opcode::SystemAudioModeStatus));
        assert_eq!(sent[0].encode().unwrap(), vec![0x50, 0x7E, 0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_activation_is_retried() {
        let processor = processor();
        processor
            .engine()
            .adapter()
            .answer_requests(processor.registry().clone());

        assert!(
            processor
                .activate_source(LogicalAddress::AudioSystem, Duration::from_millis(300))
                .await
                .unwrap()
        );
        assert!(processor.process_pending_active_source().await.is_empty());

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(
            processor.process_pending_active_source().await,
            vec![LogicalAddress::AudioSystem]
        );
        assert!(processor
            .engine()
            .adapter()
            .sent()
            .iter()
            .any(|command| command.opcode == Some(Opcode::ActiveSource)));
    }

    #[tokio::test]
    async fn test_activate_remote_device_is_an_error() {
        let processor = processor();
        assert!(matches!(
            processor
                .activate_source(LogicalAddress::Tv, Duration::ZERO)
                .await,
            Err(CecError::DeviceNotFound(LogicalAddress::Tv))
        ));
    }
}
