//! Console settings

use std::path::{Path, PathBuf};

use cec_core::HandlerConfig;
use cec_protocol::{LogicalAddress, PhysicalAddress, VendorId};
use cec_sim::VirtualAudioSystemConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConsoleError;

/// The device this process emulates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalDeviceSettings {
    pub logical_address: LogicalAddress,
    pub physical_address: PhysicalAddress,
    pub osd_name: String,
}

impl Default for LocalDeviceSettings {
    fn default() -> Self {
        Self {
            logical_address: LogicalAddress::AudioSystem,
            physical_address: PhysicalAddress(0x1000),
            osd_name: "Soundbar".to_string(),
        }
    }
}

/// Console settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Dispatcher, transmit and arbiter timing
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub local_device: LocalDeviceSettings,
    /// Vendor the virtual TV announces; none keeps it anonymous
    #[serde(default)]
    pub tv_vendor_id: Option<VendorId>,
    /// Physical address of the source the TV asks system audio for
    #[serde(default = "default_source_address")]
    pub source_address: PhysicalAddress,
    /// Remote amplifier attached when the local device is not an audio system
    #[serde(default)]
    pub amplifier: VirtualAudioSystemConfig,
}

fn default_source_address() -> PhysicalAddress {
    PhysicalAddress(0x2000)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            handler: HandlerConfig::default(),
            local_device: LocalDeviceSettings::default(),
            tv_vendor_id: None,
            source_address: default_source_address(),
            amplifier: VirtualAudioSystemConfig::default(),
        }
    }
}

impl Settings {
    /// $XDG_CONFIG_HOME/cec-console, falling back to ~/.config/cec-console
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("cec-console"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("cec-console"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConsoleError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.handler.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load settings from the config directory, or defaults if there are none
    pub fn load() -> Result<Self, ConsoleError> {
        match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(path),
            _ => Ok(Self::default()),
        }
    }
}
