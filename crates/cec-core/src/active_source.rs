//! Active source arbitration
//!
//! Making a local device the active source is a multi-step exchange: power
//! on the TV, check the TV's vendor profile allows a switch, broadcast
//! ActiveSource, then bring the TV menu, deck status and system audio mode
//! in line. When any step fails the arbiter records a due time and the next
//! `activate_source(retry_only = true)` call at or after it runs the whole
//! sequence again.
//!
//! The arbiter has no timer of its own. [`crate::actor::run_cec_actor`]
//! re-invokes it on every `retry_poll_interval_ms` tick.

use std::sync::Mutex;

use cec_protocol::{LogicalAddress, MenuState, PowerStatus};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::adapter::BusAdapter;
use crate::device::{lock_recovering, BusDevice, DeviceStatus};
use crate::transmit::TransmitEngine;

#[derive(Debug, Default)]
struct ArbiterState {
    pending: Option<Instant>,
    handler_inited: bool,
}

/// Per-device active source state machine: idle or pending a retry
#[derive(Debug)]
pub struct ActiveSourceArbiter {
    state: Mutex<ArbiterState>,
    retry_interval: Duration,
}

impl ActiveSourceArbiter {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            state: Mutex::new(ArbiterState::default()),
            retry_interval,
        }
    }

    /// Due time of the pending retry, if any
    pub fn pending(&self) -> Option<Instant> {
        lock_recovering(&self.state).pending
    }

    /// True once a full activation has succeeded
    pub fn is_initialised(&self) -> bool {
        lock_recovering(&self.state).handler_inited
    }

    /// Run the activation `delay` from now, replacing any pending retry
    pub fn schedule_activate_source(&self, delay: Duration) {
        let due = Instant::now() + delay;
        debug!("scheduling active source activation in {:?}", delay);
        lock_recovering(&self.state).pending = Some(due);
    }

    pub fn clear_pending(&self) {
        lock_recovering(&self.state).pending = None;
    }

    fn retry_later(&self, device: &BusDevice) {
        debug!(
            "failed to make '{}' the active source. will retry later",
            device.logical_address().name()
        );
        lock_recovering(&self.state).pending = Some(Instant::now() + self.retry_interval);
    }

    /// Make `device` the active source
    ///
    /// With `retry_only` set nothing happens unless a retry is due.
    pub async fn activate_source<A: BusAdapter>(
        &self,
        device: &BusDevice,
        engine: &TransmitEngine<A>,
        retry_only: bool,
    ) -> bool {
        if !device.is_active_source() || !device.is_handled_locally() {
            return false;
        }

        if retry_only {
            let state = lock_recovering(&self.state);
            match state.pending {
                Some(due) if Instant::now() >= due => {
                    debug!("transmitting delayed activate source command");
                }
                _ => return false,
            }
        }

        let address = device.logical_address();
        info!(
            "activating source '{}' ({})",
            address.name(),
            address.as_u8()
        );

        if !retry_only {
            device.set_power_status(PowerStatus::On);
            device.set_menu_state(MenuState::Activated);
        }

        let registry = engine.registry();
        let tv = registry.device(LogicalAddress::Tv);
        let profile = tv.map(|tv| tv.vendor_profile()).unwrap_or_default();

        profile.before_activate_source(device, engine).await;

        let tv_present = tv.is_some_and(|tv| tv.status() == DeviceStatus::Present);
        match tv {
            Some(tv) if tv_present => {
                tv.power_on(engine, address).await;
            }
            _ => debug!("TV not present, not sending 'image view on'"),
        }

        let switch_allowed = tv.map_or(true, |tv| profile.source_switch_allowed(tv));
        if !switch_allowed {
            debug!(
                "source switch is currently not allowed by the {} profile",
                profile
            );
        }

        let mut failed = false;
        if switch_allowed {
            failed = !device.transmit_active_source(engine, false).await;

            if tv_present && !failed {
                device
                    .transmit_menu_state(engine, LogicalAddress::Tv, false)
                    .await;
            }

            if tv_present && !failed {
                let deck_update = engine.config().send_deck_status_on_active_source
                    || profile.sends_deck_status_on_active_source();
                if let Some(playback) = device.as_playback_device().filter(|_| deck_update) {
                    failed = !playback
                        .transmit_deck_status(engine, LogicalAddress::Tv, false)
                        .await;
                }
            }

            if tv_present && !failed {
                if let Some(audio) = device.as_audio_system() {
                    failed = !audio
                        .transmit_set_system_audio_mode(engine, LogicalAddress::Tv, false)
                        .await;
                }
            }
        }

        if failed || !switch_allowed {
            self.retry_later(device);
            return false;
        }

        let mut state = lock_recovering(&self.state);
        state.pending = None;
        state.handler_inited = true;
        true
    }
}
