//! Virtual CEC bus
//!
//! [`VirtualBus`] stands in for the HDMI-CEC adapter. Every accepted frame is
//! encoded to wire bytes, decoded again and handed to the attached virtual
//! devices. Whatever they answer is pushed on the reply channel returned by
//! [`VirtualBus::new`]; feed it back into the processor (see
//! [`forward_replies`]) to close the loop.
//!
//! A directed frame is acknowledged only when a device is attached at its
//! destination. Broadcasts are always acknowledged.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use cec_core::{BusAdapter, CecActorCommand};
use cec_protocol::{CecCommand, LogicalAddress, LogicalAddresses};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::VirtualDevice;

type SharedDevice = Arc<Mutex<dyn VirtualDevice>>;

#[derive(Default)]
struct BusState {
    devices: Vec<SharedDevice>,
    /// Every transmit call with its reply flag, failed ones included
    transmitted: Vec<(CecCommand, bool)>,
    fail_next: usize,
    unreachable: LogicalAddresses,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated bus connecting a processor to virtual devices
pub struct VirtualBus {
    state: Mutex<BusState>,
    replies: mpsc::UnboundedSender<CecCommand>,
}

impl std::fmt::Debug for VirtualBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("VirtualBus")
            .field("devices", &state.devices.len())
            .field("transmitted", &state.transmitted.len())
            .finish()
    }
}

impl VirtualBus {
    /// Create an empty bus and the channel its devices reply on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CecCommand>) {
        let (replies, reply_rx) = mpsc::unbounded_channel();
        let bus = Self {
            state: Mutex::new(BusState::default()),
            replies,
        };
        (bus, reply_rx)
    }

    /// Attach a remote device; keep a clone of the handle to inspect it
    pub fn attach(&self, device: SharedDevice) {
        let address = lock(&device).logical_address();
        debug!("attaching virtual {}", address);
        lock(&self.state).devices.push(device);
    }

    /// Reject the next `count` transmissions
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).fail_next = count;
    }

    /// Stop acknowledging frames sent to `address`
    pub fn set_unreachable(&self, address: LogicalAddress, unreachable: bool) {
        let mut state = lock(&self.state);
        if unreachable {
            state.unreachable.set(address);
        } else {
            state.unreachable.unset(address);
        }
    }

    /// Every transmit call so far, with its reply flag
    pub fn transmitted(&self) -> Vec<(CecCommand, bool)> {
        lock(&self.state).transmitted.clone()
    }

    /// Opcodes transmitted so far, polls excluded
    pub fn transmitted_opcodes(&self) -> Vec<cec_protocol::Opcode> {
        lock(&self.state)
            .transmitted
            .iter()
            .filter_map(|(command, _)| command.opcode)
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.state).transmitted.clear();
    }

    fn deliver(&self, command: &CecCommand, is_reply: bool) -> bool {
        let mut state = lock(&self.state);
        state.transmitted.push((command.clone(), is_reply));

        if state.fail_next > 0 {
            state.fail_next -= 1;
            debug!("virtual bus dropping {}", command);
            return false;
        }

        // Through the wire format, like a real adapter would
        let frame = match command.encode().and_then(|bytes| CecCommand::decode(&bytes)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("virtual bus cannot send {}: {}", command, e);
                return false;
            }
        };

        let mut acknowledged = frame.is_broadcast();
        for device in &state.devices {
            let mut device = lock(device);
            let address = device.logical_address();
            if address == frame.initiator || state.unreachable.contains(address) {
                continue;
            }
            if !frame.is_broadcast() && address != frame.destination {
                continue;
            }
            acknowledged = true;
            for reply in device.receive(&frame) {
                debug!("virtual {} replies {}", address, reply);
                // The receiver is gone once the test or session stopped
                let _ = self.replies.send(reply);
            }
        }
        acknowledged
    }
}

impl BusAdapter for VirtualBus {
    fn transmit(&self, command: &CecCommand, is_reply: bool) -> impl Future<Output = bool> + Send {
        std::future::ready(self.deliver(command, is_reply))
    }
}

/// Feed device replies into a running CEC actor until either side closes
pub async fn forward_replies(
    mut replies: mpsc::UnboundedReceiver<CecCommand>,
    cmd_tx: mpsc::Sender<CecActorCommand>,
) {
    while let Some(reply) = replies.recv().await {
        if cmd_tx.send(CecActorCommand::Command(reply)).await.is_err() {
            break;
        }
    }
}
