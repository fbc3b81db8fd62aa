//! End-to-end sessions between a CecProcessor and virtual remote devices
//!
//! Each test runs the CEC actor on a VirtualBus, with device replies fed back
//! into the actor as received commands.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cec_core::{run_cec_actor, CecActorCommand, CecEvent, CecProcessor, HandlerConfig};
use cec_protocol::{
    ArcStatus, LogicalAddress, Opcode, PhysicalAddress, PowerStatus, ShortAudioDescriptor,
    SystemAudioStatus,
};
use cec_sim::{forward_replies, VirtualAudioSystem, VirtualBus, VirtualTv};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Session {
    processor: Arc<CecProcessor<Arc<VirtualBus>>>,
    bus: Arc<VirtualBus>,
    tv: Arc<Mutex<VirtualTv>>,
    amp: Option<Arc<Mutex<VirtualAudioSystem>>>,
    cmd_tx: mpsc::Sender<CecActorCommand>,
    event_rx: mpsc::Receiver<CecEvent>,
    actor: JoinHandle<()>,
}

impl Session {
    /// Emulate `local` at `physical_address`, with a virtual TV and
    /// optionally a virtual amplifier on the bus
    fn start(local: LogicalAddress, physical_address: PhysicalAddress, with_amp: bool) -> Self {
        let (bus, replies) = VirtualBus::new();
        let bus = Arc::new(bus);

        let tv = Arc::new(Mutex::new(VirtualTv::new()));
        bus.attach(tv.clone());
        let amp = with_amp.then(|| {
            let amp = Arc::new(Mutex::new(VirtualAudioSystem::new()));
            bus.attach(amp.clone());
            amp
        });

        let processor =
            Arc::new(CecProcessor::new(bus.clone(), HandlerConfig::default()).unwrap());
        processor
            .add_local_device(local, physical_address, "Test device")
            .unwrap();
        processor.set_initialised(true);

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let actor = tokio::spawn(run_cec_actor(processor.clone(), cmd_rx, event_tx));
        tokio::spawn(forward_replies(replies, cmd_tx.clone()));

        Self {
            processor,
            bus,
            tv,
            amp,
            cmd_tx,
            event_rx,
            actor,
        }
    }

    async fn inject(&self, frame: &[u8]) {
        self.cmd_tx
            .send(CecActorCommand::Frame(frame.to_vec()))
            .await
            .unwrap();
    }

    /// Wait until a received command with `opcode` went through the dispatcher
    async fn handled(&mut self, opcode: Opcode) -> bool {
        loop {
            match self.event_rx.recv().await.unwrap() {
                CecEvent::CommandHandled { command, handled } if command.opcode == Some(opcode) => {
                    return handled
                }
                _ => {}
            }
        }
    }

    async fn activated(&mut self) -> LogicalAddress {
        loop {
            if let CecEvent::ActiveSourceActivated { address } = self.event_rx.recv().await.unwrap()
            {
                return address;
            }
        }
    }

    fn amp(&self) -> std::sync::MutexGuard<'_, VirtualAudioSystem> {
        self.amp.as_ref().unwrap().lock().unwrap()
    }

    async fn stop(self) {
        self.cmd_tx.send(CecActorCommand::Shutdown).await.unwrap();
        self.actor.await.unwrap();
    }
}

#[tokio::test]
async fn test_tv_requests_arc_from_local_audio_system() {
    let mut session = Session::start(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), false);

    // TV -> Audio: request ARC start
    session.inject(&[0x05, 0xC3]).await;
    assert!(session.handled(Opcode::RequestArcStart).await);

    assert!(session.tv.lock().unwrap().arc_active());
    let audio = session
        .processor
        .audio_system(LogicalAddress::AudioSystem)
        .unwrap();
    assert!(audio.arc_started());
    assert!(session.bus.transmitted_opcodes().contains(&Opcode::StartArc));
    assert!(!session.bus.transmitted_opcodes().contains(&Opcode::FeatureAbort));

    // TV -> Audio: request ARC end
    session.inject(&[0x05, 0xC4]).await;
    assert!(session.handled(Opcode::RequestArcEnd).await);
    assert!(!session.tv.lock().unwrap().arc_active());

    session.stop().await;
}

#[tokio::test]
async fn test_tv_enables_system_audio_on_local_audio_system() {
    let mut session = Session::start(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), false);

    // TV -> Audio: system audio mode request for the source at 2.0.0.0
    session.inject(&[0x05, 0x70, 0x20, 0x00]).await;
    assert!(session.handled(Opcode::SystemAudioModeRequest).await);

    let audio = session
        .processor
        .audio_system(LogicalAddress::AudioSystem)
        .unwrap();
    assert_eq!(audio.system_audio_status(), SystemAudioStatus::On);
    assert_eq!(session.tv.lock().unwrap().system_audio(), SystemAudioStatus::On);

    // TV -> Audio: give audio status
    session.inject(&[0x05, 0x71]).await;
    assert!(session.handled(Opcode::GiveAudioStatus).await);
    let (report, is_reply) = session.bus.transmitted().last().cloned().unwrap();
    assert_eq!(report.opcode, Some(Opcode::ReportAudioStatus));
    assert_eq!(report.destination, LogicalAddress::Tv);
    assert!(is_reply);

    session.stop().await;
}

#[tokio::test]
async fn test_unsupported_request_is_feature_aborted() {
    let mut session = Session::start(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), false);

    // TV -> Audio: select analogue service, which an audio system has no handler for
    session.inject(&[0x05, 0x92, 0x00, 0x00, 0x00, 0x01]).await;
    assert!(!session.handled(Opcode::SelectAnalogueService).await);

    let (abort, is_reply) = session.bus.transmitted().last().cloned().unwrap();
    assert_eq!(abort.opcode, Some(Opcode::FeatureAbort));
    assert_eq!(abort.destination, LogicalAddress::Tv);
    assert_eq!(abort.parameters, vec![0x92, 0x00]);
    assert!(is_reply);

    session.stop().await;
}

#[tokio::test]
async fn test_playback_device_becomes_active_source() {
    let mut session = Session::start(LogicalAddress::Playback1, PhysicalAddress(0x2000), false);

    // TV -> Playback: report power status (standby), marks the TV present
    session.inject(&[0x04, 0x90, 0x01]).await;
    assert!(session.handled(Opcode::ReportPowerStatus).await);

    session
        .cmd_tx
        .send(CecActorCommand::ActivateSource {
            address: LogicalAddress::Playback1,
            delay: Duration::ZERO,
        })
        .await
        .unwrap();
    assert_eq!(session.activated().await, LogicalAddress::Playback1);

    let tv = session.tv.lock().unwrap();
    assert_eq!(tv.power_status(), PowerStatus::On);
    assert_eq!(tv.active_source(), Some(PhysicalAddress(0x2000)));
    drop(tv);

    let opcodes = session.bus.transmitted_opcodes();
    let view_on = opcodes.iter().position(|op| *op == Opcode::ImageViewOn);
    let active = opcodes.iter().position(|op| *op == Opcode::ActiveSource);
    assert!(view_on.unwrap() < active.unwrap());
    assert!(opcodes.contains(&Opcode::MenuStatus));

    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_lg_tv_defers_switch_until_powered_on() {
    let mut session = Session::start(LogicalAddress::Playback1, PhysicalAddress(0x2000), false);

    // TV -> all: vendor id LG
    session.inject(&[0x0F, 0x87, 0x00, 0xE0, 0x91]).await;
    assert!(session.handled(Opcode::DeviceVendorId).await);
    // TV -> Playback: standby
    session.inject(&[0x04, 0x90, 0x01]).await;
    assert!(session.handled(Opcode::ReportPowerStatus).await);

    let activated = session
        .processor
        .activate_source(LogicalAddress::Playback1, Duration::ZERO)
        .await
        .unwrap();
    assert!(!activated);
    assert!(!session.bus.transmitted_opcodes().contains(&Opcode::ActiveSource));
    assert!(session
        .processor
        .device(LogicalAddress::Playback1)
        .unwrap()
        .arbiter()
        .pending()
        .is_some());

    // TV -> Playback: now on
    session.inject(&[0x04, 0x90, 0x00]).await;
    assert!(session.handled(Opcode::ReportPowerStatus).await);

    assert_eq!(session.activated().await, LogicalAddress::Playback1);
    assert_eq!(
        session.tv.lock().unwrap().active_source(),
        Some(PhysicalAddress(0x2000))
    );

    session.stop().await;
}

#[tokio::test]
async fn test_volume_and_mute_on_remote_amplifier() {
    let mut session = Session::start(LogicalAddress::Playback1, PhysicalAddress(0x2000), true);
    let processor = session.processor.clone();
    let audio = processor.audio_system(LogicalAddress::AudioSystem).unwrap();

    audio
        .volume_up(processor.engine(), LogicalAddress::Playback1, true)
        .await;
    assert!(session.handled(Opcode::ReportAudioStatus).await);
    assert_eq!(audio.audio_status().volume(), Some(26));
    assert!(!audio.audio_status().is_muted());

    let status = audio
        .mute_audio(processor.engine(), LogicalAddress::Playback1)
        .await;
    assert!(status.is_muted());
    assert_eq!(status.volume(), Some(26));
    assert!(session.amp().is_muted());

    session.stop().await;
}

#[tokio::test]
async fn test_short_audio_descriptor_report_and_abort() {
    let mut session = Session::start(LogicalAddress::Playback1, PhysicalAddress(0x2000), true);
    let processor = session.processor.clone();
    let audio = processor.audio_system(LogicalAddress::AudioSystem).unwrap();

    // AC-3 is supported
    let pending = audio
        .request_short_audio_descriptor(processor.engine(), LogicalAddress::Playback1, 0x02)
        .await;
    assert_eq!(pending, ShortAudioDescriptor::UNKNOWN);
    assert!(session.handled(Opcode::ReportShortAudioDescriptor).await);
    assert_eq!(
        audio.short_audio_descriptor(),
        ShortAudioDescriptor::from_report([0x15, 0x07, 0x50])
    );

    // DTS is not
    audio
        .request_short_audio_descriptor(processor.engine(), LogicalAddress::Playback1, 0x07)
        .await;
    assert!(session.handled(Opcode::FeatureAbort).await);
    let descriptor = audio.short_audio_descriptor();
    assert!(descriptor.is_abort_path());
    assert_eq!(descriptor.payload(), [0x00, 0xA4, 0x03]);

    session.stop().await;
}

#[tokio::test]
async fn test_system_audio_and_arc_on_remote_amplifier() {
    let mut session = Session::start(LogicalAddress::Playback1, PhysicalAddress(0x2000), true);
    let processor = session.processor.clone();
    let audio = processor.audio_system(LogicalAddress::AudioSystem).unwrap();
    let playback = processor.device(LogicalAddress::Playback1).unwrap();

    assert!(
        audio
            .enable_audio(processor.engine(), LogicalAddress::Playback1, Some(playback))
            .await
    );
    assert_eq!(audio.system_audio_status(), SystemAudioStatus::On);
    assert_eq!(session.amp().system_audio(), SystemAudioStatus::On);

    // Amplifier answers the request with StartArc towards the requester
    audio
        .request_arc_initiation(processor.engine(), LogicalAddress::Playback1)
        .await;
    assert!(session.handled(Opcode::StartArc).await);
    assert_eq!(audio.arc_status(), ArcStatus::On);

    session.stop().await;
}

#[tokio::test]
async fn test_transmit_retries_after_dropped_frame() {
    let session = Session::start(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), false);
    session.bus.fail_next(1);

    let tv = session.processor.device(LogicalAddress::Tv).unwrap();
    assert!(
        tv.request_power_status(session.processor.engine(), LogicalAddress::AudioSystem, true)
            .await
    );
    let sent = session.bus.transmitted();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|(command, _)| command.opcode == Some(Opcode::GiveDevicePowerStatus)));
    assert_eq!(tv.power_status(), PowerStatus::Standby);

    session.stop().await;
}
