//! CEC Simulation Library
//!
//! This crate provides a virtual bus for exercising `cec-core` without an
//! HDMI-CEC adapter. It includes:
//!
//! - **VirtualBus**: a [`BusAdapter`](cec_core::BusAdapter) that delivers
//!   frames to attached virtual devices and queues their replies
//! - **VirtualTv**: a TV that tracks power, the active source and ARC
//! - **VirtualAudioSystem**: an amplifier with volume, system audio mode,
//!   ARC and a set of short audio descriptors
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use cec_sim::{VirtualBus, VirtualTv};
//!
//! let (bus, replies) = VirtualBus::new();
//! let tv = Arc::new(Mutex::new(VirtualTv::new()));
//! bus.attach(tv.clone());
//!
//! // Hand `bus` to a CecProcessor and feed `replies` back into it
//! ```

pub mod audio_system;
pub mod bus;
pub mod device;
pub mod tv;

pub use audio_system::{VirtualAudioSystem, VirtualAudioSystemConfig};
pub use bus::{forward_replies, VirtualBus};
pub use device::{feature_abort, VirtualDevice};
pub use tv::VirtualTv;
