//! Playback device state

use std::sync::Mutex;

use cec_protocol::{DeckControlMode, DeckInfo, LogicalAddress};
use tracing::debug;

use crate::adapter::BusAdapter;
use crate::device::{lock_recovering, BusDevice};
use crate::transmit::TransmitEngine;

/// Deck state of a playback device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    pub deck_status: DeckInfo,
    pub deck_control_mode: DeckControlMode,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            deck_status: DeckInfo::Stop,
            deck_control_mode: DeckControlMode::Stop,
        }
    }
}

/// Playback view of a [`BusDevice`]
#[derive(Debug, Clone, Copy)]
pub struct PlaybackDevice<'a> {
    device: &'a BusDevice,
    state: &'a Mutex<PlaybackState>,
}

impl<'a> PlaybackDevice<'a> {
    pub(crate) fn new(device: &'a BusDevice, state: &'a Mutex<PlaybackState>) -> Self {
        Self { device, state }
    }

    pub fn device(&self) -> &'a BusDevice {
        self.device
    }

    pub fn state(&self) -> PlaybackState {
        lock_recovering(self.state).clone()
    }

    pub fn deck_status(&self) -> DeckInfo {
        lock_recovering(self.state).deck_status
    }

    pub fn set_deck_status(&self, status: DeckInfo) -> bool {
        let mut state = lock_recovering(self.state);
        if state.deck_status == status {
            return false;
        }
        debug!(
            "{} ({}): deck status changed from '{}' to '{}'",
            self.device.logical_address().name(),
            self.device.logical_address().as_u8(),
            state.deck_status,
            status
        );
        state.deck_status = status;
        true
    }

    pub fn deck_control_mode(&self) -> DeckControlMode {
        lock_recovering(self.state).deck_control_mode
    }

    /// Stop and eject also stop the deck
    pub fn set_deck_control_mode(&self, mode: DeckControlMode) -> bool {
        let changed = {
            let mut state = lock_recovering(self.state);
            if state.deck_control_mode == mode {
                false
            } else {
                debug!(
                    "{} ({}): deck control mode changed from '{}' to '{}'",
                    self.device.logical_address().name(),
                    self.device.logical_address().as_u8(),
                    state.deck_control_mode,
                    mode
                );
                state.deck_control_mode = mode;
                true
            }
        };
        if matches!(mode, DeckControlMode::Stop | DeckControlMode::Eject) {
            self.set_deck_status(DeckInfo::Stop);
        }
        changed
    }

    pub async fn transmit_deck_status<A: BusAdapter>(
        &self,
        engine: &TransmitEngine<A>,
        destination: LogicalAddress,
        is_reply: bool,
    ) -> bool {
        let status = self.deck_status();
        engine
            .transmit_deck_status(
                self.device.logical_address(),
                destination,
                status,
                is_reply,
            )
            .await
    }
}
