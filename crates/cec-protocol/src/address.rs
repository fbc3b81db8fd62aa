//! Logical addresses, physical addresses and vendor identifiers
//!
//! Logical addresses are the 4-bit identities carried in every frame header.
//! Physical addresses describe a device's position in the HDMI tree and are
//! always encoded as two big-endian bytes; vendor ids are three big-endian
//! bytes.

use std::fmt;

use crate::error::ParseError;
use crate::macros::byte_enum;

byte_enum! {
    /// A logical address on the CEC bus
    ///
    /// Values 0-14 identify devices, 15 addresses every device at once and
    /// 16 marks an address that has not been determined.
    pub enum LogicalAddress {
        /// Television (always 0)
        Tv = 0 => "TV",
        /// Recording device 1
        Recording1 = 1 => "Recorder 1",
        /// Recording device 2
        Recording2 = 2 => "Recorder 2",
        /// Tuner 1
        Tuner1 = 3 => "Tuner 1",
        /// Playback device 1
        Playback1 = 4 => "Playback 1",
        /// Audio system (amplifier, soundbar)
        AudioSystem = 5 => "Audio",
        /// Tuner 2
        Tuner2 = 6 => "Tuner 2",
        /// Tuner 3
        Tuner3 = 7 => "Tuner 3",
        /// Playback device 2
        Playback2 = 8 => "Playback 2",
        /// Recording device 3
        Recording3 = 9 => "Recorder 3",
        /// Tuner 4
        Tuner4 = 10 => "Tuner 4",
        /// Playback device 3
        Playback3 = 11 => "Playback 3",
        /// Reserved 1
        Reserved1 = 12 => "Reserved 1",
        /// Reserved 2
        Reserved2 = 13 => "Reserved 2",
        /// Free use
        FreeUse = 14 => "Free use",
        /// Broadcast / unregistered
        Broadcast = 15 => "Broadcast",
        /// Not determined
        Unknown = 16 => "Unknown",
    }
}

impl LogicalAddress {
    /// Every address that can appear in a frame header, in numeric order
    pub const ALL: [LogicalAddress; 16] = [
        LogicalAddress::Tv,
        LogicalAddress::Recording1,
        LogicalAddress::Recording2,
        LogicalAddress::Tuner1,
        LogicalAddress::Playback1,
        LogicalAddress::AudioSystem,
        LogicalAddress::Tuner2,
        LogicalAddress::Tuner3,
        LogicalAddress::Playback2,
        LogicalAddress::Recording3,
        LogicalAddress::Tuner4,
        LogicalAddress::Playback3,
        LogicalAddress::Reserved1,
        LogicalAddress::Reserved2,
        LogicalAddress::FreeUse,
        LogicalAddress::Broadcast,
    ];

    /// Decode a header nibble. Only the low four bits are used.
    pub fn from_nibble(value: u8) -> Self {
        Self::ALL[(value & 0x0F) as usize]
    }

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == LogicalAddress::Broadcast
    }

    /// Whether this addresses a single device (0-14)
    pub fn is_device(&self) -> bool {
        (*self as u8) < 15
    }

    /// Index into per-address tables (0-15). `Unknown` has no index.
    pub fn index(&self) -> Option<usize> {
        match self {
            LogicalAddress::Unknown => None,
            other => Some(*other as usize),
        }
    }
}

/// A set of logical addresses, stored as a 16-bit mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicalAddresses(u16);

impl LogicalAddresses {
    /// Empty set
    pub fn new() -> Self {
        Self(0)
    }

    /// Add an address. `Unknown` is ignored.
    pub fn set(&mut self, address: LogicalAddress) {
        if let Some(index) = address.index() {
            self.0 |= 1 << index;
        }
    }

    /// Remove an address
    pub fn unset(&mut self, address: LogicalAddress) {
        if let Some(index) = address.index() {
            self.0 &= !(1 << index);
        }
    }

    /// Whether the set contains `address`
    pub fn contains(&self, address: LogicalAddress) -> bool {
        address.index().is_some_and(|index| self.0 & (1 << index) != 0)
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest address in the set
    pub fn primary(&self) -> Option<LogicalAddress> {
        self.iter().next()
    }

    /// Iterate the addresses in numeric order
    pub fn iter(&self) -> impl Iterator<Item = LogicalAddress> + '_ {
        LogicalAddress::ALL
            .into_iter()
            .filter(move |address| self.contains(*address))
    }

    /// Raw mask
    pub fn bits(&self) -> u16 {
        self.0
    }
}

impl FromIterator<LogicalAddress> for LogicalAddresses {
    fn from_iter<T: IntoIterator<Item = LogicalAddress>>(iter: T) -> Self {
        let mut set = LogicalAddresses::new();
        for address in iter {
            set.set(address);
        }
        set
    }
}

/// A 16-bit physical address (`a.b.c.d`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalAddress(pub u16);

impl PhysicalAddress {
    /// Sentinel for "no address"
    pub const INVALID: PhysicalAddress = PhysicalAddress(0xFFFF);

    /// The root of the HDMI tree (the TV)
    pub const ROOT: PhysicalAddress = PhysicalAddress(0x0000);

    /// Decode two big-endian bytes
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Big-endian encoding
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Whether this is a usable address
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for PhysicalAddress {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:x}.{:x}.{:x}.{:x}",
            (v >> 12) & 0xF,
            (v >> 8) & 0xF,
            (v >> 4) & 0xF,
            v & 0xF
        )
    }
}

/// A 24-bit IEEE OUI identifying a device vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VendorId(u32);

impl VendorId {
    pub const UNKNOWN: VendorId = VendorId(0);
    pub const TOSHIBA: VendorId = VendorId(0x00_0039);
    pub const SAMSUNG: VendorId = VendorId(0x00_00F0);
    pub const DENON: VendorId = VendorId(0x00_05CD);
    pub const MARANTZ: VendorId = VendorId(0x00_0678);
    pub const ONKYO: VendorId = VendorId(0x00_09B0);
    pub const PANASONIC: VendorId = VendorId(0x00_8045);
    pub const PHILIPS: VendorId = VendorId(0x00_903E);
    pub const YAMAHA: VendorId = VendorId(0x00_A0DE);
    pub const PIONEER: VendorId = VendorId(0x00_E036);
    pub const LG: VendorId = VendorId(0x00_E091);
    pub const SONY: VendorId = VendorId(0x08_0046);
    pub const SHARP: VendorId = VendorId(0x08_001F);

    /// Create from a raw value. Bits above 24 are discarded.
    pub fn new(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    /// Decode three big-endian bytes
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self((bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32)
    }

    /// Decode from the first three bytes of an operand list
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        match bytes {
            [a, b, c, ..] => Ok(Self::from_bytes([*a, *b, *c])),
            _ => Err(ParseError::Incomplete {
                needed: 3 - bytes.len(),
            }),
        }
    }

    /// Big-endian encoding
    pub fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// Raw 24-bit value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Whether the vendor is known
    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }

    /// Vendor name, or "Unknown" for unlisted ids
    pub fn name(&self) -> &'static str {
        match *self {
            Self::TOSHIBA => "Toshiba",
            Self::SAMSUNG => "Samsung",
            Self::DENON => "Denon",
            Self::MARANTZ => "Marantz",
            Self::ONKYO => "Onkyo",
            Self::PANASONIC => "Panasonic",
            Self::PHILIPS => "Philips",
            Self::YAMAHA => "Yamaha",
            Self::PIONEER => "Pioneer",
            Self::LG => "LG",
            Self::SONY => "Sony",
            Self::SHARP => "Sharp",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:06X})", self.name(), self.0)
    }
}
