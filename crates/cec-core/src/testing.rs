//! Test doubles shared by the unit tests

use std::future::Future;
use std::sync::{Arc, Mutex};

use cec_protocol::{CecCommand, ResponseTable};

use crate::adapter::BusAdapter;
use crate::config::HandlerConfig;
use crate::device::lock_recovering;
use crate::registry::DeviceRegistry;
use crate::transmit::TransmitEngine;

#[derive(Debug, Default)]
struct Recorder {
    sent: Vec<CecCommand>,
    attempts: usize,
    fail_next: usize,
    fail_all: bool,
    responder: Option<Arc<DeviceRegistry>>,
}

/// Adapter that records frames and can answer requests instantly
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    inner: Mutex<Recorder>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames that were accepted
    pub fn sent(&self) -> Vec<CecCommand> {
        lock_recovering(&self.inner).sent.clone()
    }

    /// Physical send attempts, failed ones included
    pub fn attempts(&self) -> usize {
        lock_recovering(&self.inner).attempts
    }

    pub fn fail_all(&self, fail: bool) {
        lock_recovering(&self.inner).fail_all = fail;
    }

    pub fn fail_next(&self, count: usize) {
        lock_recovering(&self.inner).fail_next = count;
    }

    /// Signal the expected response of every accepted frame
    pub fn answer_requests(&self, registry: Arc<DeviceRegistry>) {
        lock_recovering(&self.inner).responder = Some(registry);
    }
}

impl BusAdapter for RecordingAdapter {
    fn transmit(&self, command: &CecCommand, _is_reply: bool) -> impl Future<Output = bool> + Send {
        let mut inner = lock_recovering(&self.inner);
        inner.attempts += 1;
        let accepted = if inner.fail_all {
            false
        } else if inner.fail_next > 0 {
            inner.fail_next -= 1;
            false
        } else {
            inner.sent.push(command.clone());
            true
        };

        if accepted {
            if let (Some(registry), Some(opcode)) = (inner.responder.as_ref(), command.opcode) {
                let table = match opcode {
                    cec_protocol::Opcode::Standby => ResponseTable::Standby,
                    _ if registry
                        .device(command.destination)
                        .is_some_and(|device| device.is_unsupported_feature(opcode)) =>
                    {
                        ResponseTable::FeatureAbort
                    }
                    _ => ResponseTable::General,
                };
                if let Some(response) = table.expected_response(opcode) {
                    if command.destination.is_broadcast() {
                        registry.signal_all(response);
                    } else if let Some(device) = registry.device(command.destination) {
                        device.signal_opcode(response);
                    }
                }
            }
        }
        std::future::ready(accepted)
    }
}

pub fn engine_with(
    registry: Arc<DeviceRegistry>,
    adapter: Arc<RecordingAdapter>,
) -> TransmitEngine<Arc<RecordingAdapter>> {
    TransmitEngine::new(adapter, registry, HandlerConfig::default())
}
