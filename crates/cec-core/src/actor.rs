//! CEC actor
//!
//! Runs a [`CecProcessor`] behind a command channel and reports what happened
//! on an event channel.
//!
//! Each frame or request is processed on its own task so that a handler
//! waiting for a reply does not hold up the frame carrying that reply. The
//! actor also owns the periodic re-invocation of pending active source
//! activations (`retry_poll_interval_ms`); at most one retry pass runs at a
//! time.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cec_core::{run_cec_actor, CecActorCommand, CecProcessor, HandlerConfig};
//! use tokio::sync::mpsc;
//!
//! let processor = Arc::new(CecProcessor::new(adapter, HandlerConfig::default())?);
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//! tokio::spawn(run_cec_actor(processor, cmd_rx, event_tx));
//!
//! cmd_tx.send(CecActorCommand::Frame(vec![0x05, 0x71])).await?;
//! ```

use std::sync::Arc;

use cec_protocol::{CecCommand, LogicalAddress};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::adapter::BusAdapter;
use crate::device::DeviceSnapshot;
use crate::error::CecError;
use crate::events::CecEvent;
use crate::processor::CecProcessor;

/// Commands sent to the CEC actor
#[derive(Debug)]
pub enum CecActorCommand {
    /// Raw frame received from the bus
    Frame(Vec<u8>),

    /// Already decoded command received from the bus
    Command(CecCommand),

    /// Make a local device the active source, now or after `delay`
    ActivateSource {
        address: LogicalAddress,
        delay: Duration,
    },

    /// Send a command and report whether it (and its reply) made it
    Transmit {
        command: CecCommand,
        response: oneshot::Sender<bool>,
    },

    /// Copy of a device's state
    Snapshot {
        address: LogicalAddress,
        response: oneshot::Sender<Result<DeviceSnapshot, CecError>>,
    },

    /// Stop the actor
    Shutdown,
}

async fn handle_command<A: BusAdapter>(
    processor: &CecProcessor<A>,
    event_tx: &mpsc::Sender<CecEvent>,
    command: CecCommand,
) {
    let handled = processor.handle_command(&command).await;
    let _ = event_tx
        .send(CecEvent::CommandHandled { command, handled })
        .await;
}

/// Run the CEC actor until `Shutdown` or until the command channel closes
pub async fn run_cec_actor<A>(
    processor: Arc<CecProcessor<A>>,
    mut cmd_rx: mpsc::Receiver<CecActorCommand>,
    event_tx: mpsc::Sender<CecEvent>,
) where
    A: BusAdapter + 'static,
{
    info!("CEC actor started");

    let mut retry_timer = interval(processor.config().retry_poll_interval());
    retry_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut retry_pass: Option<JoinHandle<()>> = None;
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    CecActorCommand::Frame(frame) => match CecCommand::decode(&frame) {
                        Ok(command) => {
                            let processor = processor.clone();
                            let event_tx = event_tx.clone();
                            tasks.spawn(async move {
                                handle_command(&processor, &event_tx, command).await;
                            });
                        }
                        Err(e) => {
                            warn!("rejected frame {:02x?}: {}", frame, e);
                            let _ = event_tx
                                .send(CecEvent::FrameRejected {
                                    frame,
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    },

                    CecActorCommand::Command(command) => {
                        let processor = processor.clone();
                        let event_tx = event_tx.clone();
                        tasks.spawn(async move {
                            handle_command(&processor, &event_tx, command).await;
                        });
                    }

                    CecActorCommand::ActivateSource { address, delay } => {
                        let processor = processor.clone();
                        let event_tx = event_tx.clone();
                        tasks.spawn(async move {
                            match processor.activate_source(address, delay).await {
                                // A delayed activation reports from the retry pass
                                Ok(true) if delay.is_zero() => {
                                    let _ = event_tx
                                        .send(CecEvent::ActiveSourceActivated { address })
                                        .await;
                                }
                                Ok(_) => {}
                                Err(e) => warn!("cannot activate {}: {}", address, e),
                            }
                        });
                    }

                    CecActorCommand::Transmit { command, response } => {
                        let processor = processor.clone();
                        tasks.spawn(async move {
                            let sent = processor.transmit(command).await;
                            let _ = response.send(sent);
                        });
                    }

                    CecActorCommand::Snapshot { address, response } => {
                        let _ = response.send(processor.snapshot(address));
                    }

                    CecActorCommand::Shutdown => {
                        info!("CEC actor shutting down");
                        break;
                    }
                }
            }

            _ = retry_timer.tick() => {
                if retry_pass.as_ref().is_some_and(|pass| !pass.is_finished()) {
                    continue;
                }
                let processor = processor.clone();
                let event_tx = event_tx.clone();
                retry_pass = Some(tokio::spawn(async move {
                    for address in processor.process_pending_active_source().await {
                        let _ = event_tx
                            .send(CecEvent::ActiveSourceActivated { address })
                            .await;
                    }
                }));
            }

            Some(joined) = tasks.join_next() => {
                if let Err(e) = joined {
                    warn!("CEC task failed: {}", e);
                }
            }
        }
    }

    if let Some(pass) = retry_pass {
        pass.abort();
    }
    tasks.shutdown().await;
    debug!("CEC actor stopped");
}
