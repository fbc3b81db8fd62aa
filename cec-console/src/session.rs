//! Scripted session over the virtual bus
//!
//! With an emulated audio system the virtual TV walks it through the ARC and
//! system audio handshakes. With any other local device the device becomes
//! the active source and then drives a virtual amplifier's volume.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cec_core::{run_cec_actor, CecActorCommand, CecEvent, CecProcessor};
use cec_protocol::{CecCommand, LogicalAddress, Opcode, PhysicalAddress};
use cec_sim::{forward_replies, VirtualAudioSystem, VirtualBus, VirtualTv};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ConsoleError;
use crate::settings::Settings;

/// How long a step waits for its command to be handled
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

struct Console {
    processor: Arc<CecProcessor<Arc<VirtualBus>>>,
    bus: Arc<VirtualBus>,
    local: LogicalAddress,
    cmd_tx: mpsc::Sender<CecActorCommand>,
    event_rx: mpsc::Receiver<CecEvent>,
    actor: JoinHandle<()>,
}

impl Console {
    /// Send a frame as if the TV had put it on the bus and wait for the
    /// dispatcher to finish with it
    async fn from_tv(&mut self, opcode: Opcode, operands: &[u8]) -> Result<bool, ConsoleError> {
        let command = CecCommand::new(LogicalAddress::Tv, self.local, opcode).with_bytes(operands);
        self.inject(command).await
    }

    async fn inject(&mut self, command: CecCommand) -> Result<bool, ConsoleError> {
        let opcode = command.opcode;
        info!(">> {}", command);
        self.cmd_tx
            .send(CecActorCommand::Frame(command.encode().map_err(cec_core::CecError::from)?))
            .await
            .map_err(|_| cec_core::CecError::ActorStopped)?;

        let wait = async {
            while let Some(event) = self.event_rx.recv().await {
                match event {
                    CecEvent::CommandHandled { command, handled } if command.opcode == opcode => {
                        return Some(handled)
                    }
                    CecEvent::FrameRejected { error, .. } => warn!("frame rejected: {}", error),
                    _ => {}
                }
            }
            None
        };
        let step = opcode.map(|op| op.name().to_string()).unwrap_or_default();
        match tokio::time::timeout(STEP_TIMEOUT, wait).await {
            Ok(Some(handled)) => Ok(handled),
            Ok(None) => Err(cec_core::CecError::ActorStopped.into()),
            Err(_) => Err(ConsoleError::Timeout(step, STEP_TIMEOUT)),
        }
    }

    async fn wait_activated(&mut self) -> Result<LogicalAddress, ConsoleError> {
        let wait = async {
            while let Some(event) = self.event_rx.recv().await {
                if let CecEvent::ActiveSourceActivated { address } = event {
                    return Some(address);
                }
            }
            None
        };
        match tokio::time::timeout(STEP_TIMEOUT, wait).await {
            Ok(Some(address)) => Ok(address),
            Ok(None) => Err(cec_core::CecError::ActorStopped.into()),
            Err(_) => Err(ConsoleError::Timeout("active source".to_string(), STEP_TIMEOUT)),
        }
    }

    async fn shutdown(self) {
        let _ = self.cmd_tx.send(CecActorCommand::Shutdown).await;
        if let Err(e) = self.actor.await {
            warn!("CEC actor ended abnormally: {}", e);
        }
    }
}

/// Run the scripted session described by `settings`
pub async fn run(settings: Settings) -> Result<(), ConsoleError> {
    let (bus, replies) = VirtualBus::new();
    let bus = Arc::new(bus);

    let tv = Arc::new(Mutex::new(match settings.tv_vendor_id {
        Some(vendor) => VirtualTv::new().with_vendor(vendor),
        None => VirtualTv::new(),
    }));
    bus.attach(tv.clone());

    let local = settings.local_device.logical_address;
    let amplifier = (local != LogicalAddress::AudioSystem).then(|| {
        let amp = Arc::new(Mutex::new(VirtualAudioSystem::from_config(
            settings.amplifier.clone(),
        )));
        bus.attach(amp.clone());
        amp
    });

    let processor = Arc::new(CecProcessor::new(bus.clone(), settings.handler.clone())?);
    processor.add_local_device(
        local,
        settings.local_device.physical_address,
        &settings.local_device.osd_name,
    )?;
    processor.set_initialised(true);

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);
    let actor = tokio::spawn(run_cec_actor(processor.clone(), cmd_rx, event_tx));
    tokio::spawn(forward_replies(replies, cmd_tx.clone()));

    let mut console = Console {
        processor,
        bus,
        local,
        cmd_tx,
        event_rx,
        actor,
    };

    if let Some(vendor) = settings.tv_vendor_id {
        let announce = CecCommand::new(LogicalAddress::Tv, LogicalAddress::Broadcast, Opcode::DeviceVendorId)
            .with_bytes(&vendor.to_bytes());
        console.inject(announce).await?;
    }

    let result = if local == LogicalAddress::AudioSystem {
        audio_system_script(&mut console, settings.source_address).await
    } else {
        source_script(&mut console).await
    };

    report(&console, &tv, amplifier.as_ref());
    console.shutdown().await;
    result
}

async fn audio_system_script(
    console: &mut Console,
    source: PhysicalAddress,
) -> Result<(), ConsoleError> {
    console.from_tv(Opcode::GiveDevicePowerStatus, &[]).await?;
    console.from_tv(Opcode::GiveOsdName, &[]).await?;

    let started = console.from_tv(Opcode::RequestArcStart, &[]).await?;
    info!("ARC initiation {}", if started { "done" } else { "failed" });

    console
        .from_tv(Opcode::SystemAudioModeRequest, &source.to_bytes())
        .await?;
    console.from_tv(Opcode::GiveAudioStatus, &[]).await?;
    console.from_tv(Opcode::GiveSystemAudioModeStatus, &[]).await?;

    // Plain vendor commands have no mapping; this one ends up in the diagnostic log
    console.from_tv(Opcode::VendorCommand, &[0x01, 0x02]).await?;

    console.from_tv(Opcode::SystemAudioModeRequest, &[]).await?;
    let ended = console.from_tv(Opcode::RequestArcEnd, &[]).await?;
    info!("ARC termination {}", if ended { "done" } else { "failed" });
    Ok(())
}

async fn source_script(console: &mut Console) -> Result<(), ConsoleError> {
    // Learn the TV's power state first so the arbiter can wake it
    let tv = console.processor.device(LogicalAddress::Tv)?;
    tv.request_power_status(console.processor.engine(), console.local, true)
        .await;

    console
        .cmd_tx
        .send(CecActorCommand::ActivateSource {
            address: console.local,
            delay: Duration::ZERO,
        })
        .await
        .map_err(|_| cec_core::CecError::ActorStopped)?;
    let address = console.wait_activated().await?;
    info!("{} is the active source", address);

    let processor = console.processor.clone();
    let audio = processor.audio_system(LogicalAddress::AudioSystem)?;
    let engine = processor.engine();
    let source = processor.device(console.local)?;
    if audio.enable_audio(engine, console.local, Some(source)).await {
        info!("system audio: {}", audio.system_audio_status());
    }
    audio.volume_up(engine, console.local, true).await;
    audio.volume_up(engine, console.local, true).await;
    let status = audio.mute_audio(engine, console.local).await;
    info!("amplifier volume: {}", status);

    let descriptor = audio
        .request_short_audio_descriptor(engine, console.local, 0x02)
        .await;
    info!("AC-3 descriptor requested (currently {})", descriptor);
    Ok(())
}

fn report(
    console: &Console,
    tv: &Arc<Mutex<VirtualTv>>,
    amplifier: Option<&Arc<Mutex<VirtualAudioSystem>>>,
) {
    info!("{} frames transmitted", console.bus.transmitted().len());
    if let Ok(tv) = tv.lock() {
        info!(
            "virtual TV: power {}, active source {}, ARC {}",
            tv.power_status(),
            tv.active_source()
                .map(|address| address.to_string())
                .unwrap_or_else(|| "none".to_string()),
            if tv.arc_active() { "on" } else { "off" }
        );
    }
    if let Some(Ok(amp)) = amplifier.map(|amp| amp.lock()) {
        info!(
            "virtual amplifier: {}, system audio {}",
            amp.audio_status(),
            amp.system_audio()
        );
    }

    match console.processor.snapshot(console.local) {
        Ok(snapshot) => info!("local device: {:?}", snapshot),
        Err(e) => warn!("no snapshot: {}", e),
    }
    let unmapped = console.processor.unmapped_commands();
    if !unmapped.is_empty() {
        warn!("{} unmapped command(s) recorded", unmapped.len());
    }
}
