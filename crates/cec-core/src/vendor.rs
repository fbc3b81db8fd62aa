//! Vendor profiles
//!
//! Some TVs and audio systems need tweaks to the generic behaviour. A profile
//! is picked once a device reports its vendor id; the TV's profile governs
//! source switching for the local devices.

use cec_protocol::{LogicalAddress, PowerStatus, VendorId};
use tracing::debug;

use crate::adapter::BusAdapter;
use crate::device::BusDevice;
use crate::transmit::TransmitEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VendorProfile {
    #[default]
    Generic,
    Panasonic,
    Lg,
    Pioneer,
}

impl VendorProfile {
    pub fn for_vendor(vendor: VendorId) -> Self {
        match vendor {
            VendorId::PANASONIC => VendorProfile::Panasonic,
            VendorId::LG => VendorProfile::Lg,
            VendorId::PIONEER => VendorProfile::Pioneer,
            _ => VendorProfile::Generic,
        }
    }

    pub fn is_generic(self) -> bool {
        self == VendorProfile::Generic
    }

    pub fn name(self) -> &'static str {
        match self {
            VendorProfile::Generic => "generic",
            VendorProfile::Panasonic => "Panasonic",
            VendorProfile::Lg => "LG",
            VendorProfile::Pioneer => "Pioneer",
        }
    }

    /// Whether a local device may announce itself as active source now
    ///
    /// LG TVs drop the switch while they are still powering up.
    pub fn source_switch_allowed(self, tv: &BusDevice) -> bool {
        match self {
            VendorProfile::Lg => tv.power_status() == PowerStatus::On,
            _ => true,
        }
    }

    pub fn sends_deck_status_on_active_source(self) -> bool {
        self == VendorProfile::Panasonic
    }

    /// Runs before the TV is powered on during source activation
    pub async fn before_activate_source<A: BusAdapter>(
        self,
        device: &BusDevice,
        engine: &TransmitEngine<A>,
    ) {
        if self != VendorProfile::Panasonic {
            return;
        }
        let Some(tv) = engine.registry().device(LogicalAddress::Tv) else {
            return;
        };
        debug!("{} TV: refreshing power status before activating source", self.name());
        tv.request_power_status(engine, device.logical_address(), false)
            .await;
    }

    /// Vendor commands this profile rejects outright
    pub fn refuses_vendor_commands_from(self, initiator: LogicalAddress) -> bool {
        self == VendorProfile::Pioneer && initiator == LogicalAddress::AudioSystem
    }
}

impl std::fmt::Display for VendorProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
