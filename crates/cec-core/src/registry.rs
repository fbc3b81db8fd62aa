//! Device registry
//!
//! Owns one [`BusDevice`] per logical address (0-15) and knows which of them
//! are emulated by this process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use cec_protocol::{LogicalAddress, LogicalAddresses, Opcode, PhysicalAddress, PowerStatus};
use tracing::{debug, info};

use crate::config::HandlerConfig;
use crate::device::{lock_recovering, BusDevice, DeviceStatus};

/// All devices on the bus, local and remote
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: Vec<BusDevice>,
    local: Mutex<LogicalAddresses>,
    initialised: AtomicBool,
}

impl DeviceRegistry {
    pub fn new(config: &HandlerConfig) -> Self {
        let devices = LogicalAddress::ALL
            .into_iter()
            .map(|address| BusDevice::new(address, config.active_source_retry()))
            .collect();
        Self {
            devices,
            local: Mutex::new(LogicalAddresses::new()),
            initialised: AtomicBool::new(false),
        }
    }

    /// Device at `address`; `Unknown` has none
    pub fn device(&self, address: LogicalAddress) -> Option<&BusDevice> {
        address.index().and_then(|index| self.devices.get(index))
    }

    /// Device reporting `address`, preferring locally handled ones
    pub fn device_by_physical_address(&self, address: PhysicalAddress) -> Option<&BusDevice> {
        if !address.is_valid() {
            return None;
        }
        let mut matches = self
            .devices
            .iter()
            .filter(|device| device.logical_address().is_device())
            .filter(|device| device.physical_address() == address);
        let first = matches.next()?;
        if first.is_handled_locally() {
            return Some(first);
        }
        Some(
            matches
                .find(|device| device.is_handled_locally())
                .unwrap_or(first),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &BusDevice> {
        self.devices.iter()
    }

    pub fn is_handled_locally(&self, address: LogicalAddress) -> bool {
        lock_recovering(&self.local).contains(address)
    }

    /// Addresses emulated by this process
    pub fn logical_addresses(&self) -> LogicalAddresses {
        *lock_recovering(&self.local)
    }

    pub fn local_devices(&self) -> Vec<&BusDevice> {
        let local = self.logical_addresses();
        local
            .iter()
            .filter_map(|address| self.device(address))
            .collect()
    }

    /// First local device, used for announcements on behalf of this process
    pub fn primary_local_device(&self) -> Option<&BusDevice> {
        self.logical_addresses()
            .primary()
            .and_then(|address| self.device(address))
    }

    /// Claim `address` for this process
    pub fn register_local(
        &self,
        address: LogicalAddress,
        physical_address: PhysicalAddress,
    ) -> Option<&BusDevice> {
        if !address.is_device() {
            return None;
        }
        let device = self.device(address)?;
        lock_recovering(&self.local).set(address);
        device.set_device_status(DeviceStatus::HandledLocally);
        device.set_physical_address(physical_address);
        device.set_power_status(PowerStatus::On);
        info!(
            "registered local device '{}' ({}) at {}",
            address.name(),
            address.as_u8(),
            physical_address
        );
        Some(device)
    }

    pub fn unregister_local(&self, address: LogicalAddress) {
        lock_recovering(&self.local).unset(address);
        if let Some(device) = self.device(address) {
            device.set_device_status(DeviceStatus::Unknown);
            device.set_active_source_flag(false);
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    pub fn set_initialised(&self, initialised: bool) {
        self.initialised.store(initialised, Ordering::Release);
    }

    /// Make `address` the only active source
    pub fn mark_as_active_source(&self, address: LogicalAddress) -> bool {
        let Some(device) = self.device(address) else {
            return false;
        };
        let changed = device.set_active_source_flag(true);
        for other in self.devices.iter() {
            if other.logical_address() != address {
                other.set_active_source_flag(false);
            }
        }
        changed
    }

    pub fn mark_as_inactive_source(&self, address: LogicalAddress) -> bool {
        self.device(address)
            .is_some_and(|device| device.set_active_source_flag(false))
    }

    pub fn active_source(&self) -> Option<LogicalAddress> {
        self.devices
            .iter()
            .find(|device| device.is_active_source())
            .map(|device| device.logical_address())
    }

    /// Signal `opcode` on every device
    pub fn signal_all(&self, opcode: Opcode) {
        debug!("signalling '{}' on all devices", opcode);
        for device in self.devices.iter() {
            device.signal_opcode(opcode);
        }
    }
}
