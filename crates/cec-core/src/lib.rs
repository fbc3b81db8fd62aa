//! CEC Message Handling Core
//!
//! This crate holds the device model and the message handling logic that
//! sits on top of the `cec-protocol` frame codec.
//!
//! # Architecture
//!
//! - [`DeviceRegistry`] owns one [`BusDevice`] per logical address. Local
//!   audio systems and playback devices carry extra state behind
//!   [`BusDevice::as_audio_system`] and [`BusDevice::as_playback_device`].
//! - [`TransmitEngine`] sends commands through a [`BusAdapter`], waits for the
//!   expected reply and retries on timeout.
//! - [`CommandDispatcher`] applies received commands to the registry and
//!   answers them, sending a Feature Abort when a command is not handled.
//! - [`ActiveSourceArbiter`] drives the "become the active source" sequence,
//!   deferring it while the TV refuses the switch.
//! - [`run_cec_actor`] runs a [`CecProcessor`] behind channels, emitting
//!   [`CecEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use cec_core::{CecProcessor, HandlerConfig};
//! use cec_protocol::{LogicalAddress, PhysicalAddress};
//!
//! let processor = CecProcessor::new(adapter, HandlerConfig::default())?;
//! processor.add_local_device(LogicalAddress::AudioSystem, PhysicalAddress(0x1000), "Soundbar")?;
//! processor.set_initialised(true);
//!
//! // TV asks the soundbar to start ARC
//! processor.on_frame(&[0x05, 0xC3]).await?;
//! ```

pub mod active_source;
pub mod actor;
pub mod adapter;
pub mod audio;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod playback;
pub mod processor;
pub mod registry;
pub mod transmit;
pub mod vendor;

#[cfg(test)]
mod testing;

// Re-export actor types
pub use actor::{run_cec_actor, CecActorCommand};
pub use events::CecEvent;

// Re-export device model
pub use active_source::ActiveSourceArbiter;
pub use audio::{AudioSystem, AudioSystemState};
pub use device::{BusDevice, DeviceKind, DeviceSnapshot, DeviceState, DeviceStatus};
pub use playback::{PlaybackDevice, PlaybackState};
pub use registry::DeviceRegistry;
pub use vendor::VendorProfile;

// Re-export engine types
pub use adapter::BusAdapter;
pub use config::HandlerConfig;
pub use diagnostics::UnmappedCommandLog;
pub use dispatch::{CommandDispatcher, Handled};
pub use error::CecError;
pub use processor::CecProcessor;
pub use transmit::TransmitEngine;
