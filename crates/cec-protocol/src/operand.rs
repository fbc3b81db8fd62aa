//! Operand types carried in CEC parameters

use std::fmt;

use crate::macros::byte_enum;

byte_enum! {
    /// Reason carried in a feature abort
    pub enum AbortReason {
        /// No handler exists for the opcode
        UnrecognizedOpcode = 0 => "unrecognised opcode",
        /// Destination is not initialised or not in a state to answer
        NotInCorrectModeToRespond = 1 => "not in correct mode to respond",
        /// Cannot provide source
        CannotProvideSource = 2 => "cannot provide source",
        /// Parameter length or content is wrong
        InvalidOperand = 3 => "invalid operand",
        /// Rejected by policy
        Refused = 4 => "refused",
        /// Unable to determine
        UnableToDetermine = 5 => "unable to determine",
    }
}

byte_enum! {
    /// System audio mode as reported by an audio system
    pub enum SystemAudioStatus {
        Off = 0 => "off",
        On = 1 => "on",
        Unknown = 2 => "unknown",
    }
}

byte_enum! {
    /// State of the audio return channel link
    pub enum ArcStatus {
        Off = 0 => "off",
        On = 1 => "on",
        Unknown = 2 => "unknown",
    }
}

byte_enum! {
    /// Device power state
    pub enum PowerStatus {
        On = 0x00 => "on",
        Standby = 0x01 => "standby",
        InTransitionStandbyToOn = 0x02 => "in transition from standby to on",
        InTransitionOnToStandby = 0x03 => "in transition from on to standby",
        Unknown = 0x99 => "unknown",
    }
}

impl PowerStatus {
    /// Standby, or on its way there
    pub fn is_standby(&self) -> bool {
        matches!(
            self,
            PowerStatus::Standby | PowerStatus::InTransitionOnToStandby
        )
    }
}

byte_enum! {
    /// Menu state reported in menu status
    pub enum MenuState {
        Activated = 0 => "activated",
        Deactivated = 1 => "deactivated",
    }
}

byte_enum! {
    /// Operand of a menu request
    pub enum MenuRequestType {
        Activate = 0 => "activate",
        Deactivate = 1 => "deactivate",
        Query = 2 => "query",
    }
}

byte_enum! {
    /// Deck state reported in deck status
    pub enum DeckInfo {
        Play = 0x11 => "play",
        Record = 0x12 => "record",
        PlayReverse = 0x13 => "play reverse",
        Still = 0x14 => "still",
        Slow = 0x15 => "slow",
        SlowReverse = 0x16 => "slow reverse",
        FastForward = 0x17 => "fast forward",
        FastReverse = 0x18 => "fast reverse",
        NoMedia = 0x19 => "no media",
        Stop = 0x1A => "stop",
        SkipForwardWind = 0x1B => "skip forward / wind",
        SkipReverseRewind = 0x1C => "skip reverse / rewind",
        IndexSearchForward = 0x1D => "index search forward",
        IndexSearchReverse = 0x1E => "index search reverse",
        OtherStatus = 0x1F => "other",
    }
}

byte_enum! {
    /// Operand of a deck control command
    pub enum DeckControlMode {
        SkipForwardWind = 1 => "skip forward / wind",
        SkipReverseRewind = 2 => "skip reverse / rewind",
        Stop = 3 => "stop",
        Eject = 4 => "eject",
    }
}

byte_enum! {
    /// CEC version a device implements
    pub enum CecVersion {
        V1_2 = 0x01 => "1.2",
        V1_2a = 0x02 => "1.2a",
        V1_3 = 0x03 => "1.3",
        V1_3a = 0x04 => "1.3a",
        V1_4 = 0x05 => "1.4",
        V2_0 = 0x06 => "2.0",
        Unknown = 0xFF => "unknown",
    }
}

byte_enum! {
    /// Device type announced with the physical address
    pub enum DeviceType {
        Tv = 0 => "TV",
        RecordingDevice = 1 => "recording device",
        Reserved = 2 => "reserved",
        Tuner = 3 => "tuner",
        PlaybackDevice = 4 => "playback device",
        AudioSystem = 5 => "audio system",
    }
}

byte_enum! {
    /// Remote control keys carried in user control pressed
    pub enum UserControlCode {
        Select = 0x00 => "select",
        Up = 0x01 => "up",
        Down = 0x02 => "down",
        Left = 0x03 => "left",
        Right = 0x04 => "right",
        RootMenu = 0x09 => "root menu",
        Exit = 0x0D => "exit",
        Number0 = 0x20 => "0",
        Number1 = 0x21 => "1",
        Number2 = 0x22 => "2",
        Number3 = 0x23 => "3",
        Number4 = 0x24 => "4",
        Number5 = 0x25 => "5",
        Number6 = 0x26 => "6",
        Number7 = 0x27 => "7",
        Number8 = 0x28 => "8",
        Number9 = 0x29 => "9",
        ChannelUp = 0x30 => "channel up",
        ChannelDown = 0x31 => "channel down",
        Power = 0x40 => "power",
        VolumeUp = 0x41 => "volume up",
        VolumeDown = 0x42 => "volume down",
        Mute = 0x43 => "mute",
        Play = 0x44 => "play",
        Stop = 0x45 => "stop",
        Pause = 0x46 => "pause",
        Record = 0x47 => "record",
        Rewind = 0x48 => "rewind",
        FastForward = 0x49 => "fast forward",
        Eject = 0x4A => "eject",
        Forward = 0x4B => "forward",
        Backward = 0x4C => "backward",
        PowerToggleFunction = 0x6B => "power toggle",
        PowerOffFunction = 0x6C => "power off",
        PowerOnFunction = 0x6D => "power on",
        F1Blue = 0x71 => "F1 (blue)",
        F2Red = 0x72 => "F2 (red)",
        F3Green = 0x73 => "F3 (green)",
        F4Yellow = 0x74 => "F4 (yellow)",
    }
}

impl UserControlCode {
    /// Keys that change the power state of the receiving device
    pub fn is_power_key(&self) -> bool {
        matches!(
            self,
            UserControlCode::Power
                | UserControlCode::PowerToggleFunction
                | UserControlCode::PowerOnFunction
                | UserControlCode::PowerOffFunction
        )
    }
}

/// Packed audio status: bit 7 is mute, bits 0-6 are the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioStatus(pub u8);

impl AudioStatus {
    pub const MUTE_MASK: u8 = 0x80;
    pub const VOLUME_MASK: u8 = 0x7F;

    /// Volume not known
    pub const UNKNOWN: AudioStatus = AudioStatus(0x7F);

    /// Status reported while the audio return channel is up
    pub const ARC_FORCED: AudioStatus = AudioStatus(0x50);

    pub fn new(volume: u8, muted: bool) -> Self {
        let mute = if muted { Self::MUTE_MASK } else { 0 };
        Self(mute | (volume.min(100) & Self::VOLUME_MASK))
    }

    pub fn is_muted(&self) -> bool {
        self.0 & Self::MUTE_MASK != 0
    }

    /// Volume in percent, `None` when unknown
    pub fn volume(&self) -> Option<u8> {
        match self.0 & Self::VOLUME_MASK {
            v if v <= 100 => Some(v),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.volume().is_none()
    }
}

impl Default for AudioStatus {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for AudioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.volume() {
            Some(v) if self.is_muted() => write!(f, "{}% (muted)", v),
            Some(v) => write!(f, "{}%", v),
            None => f.write_str("unknown"),
        }
    }
}

/// A short audio descriptor as tracked for an audio system
///
/// The top byte is a marker: `0x00` for a descriptor reported directly,
/// `0xFA` for one reconstructed from a feature abort of the request. The
/// remaining three bytes are the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortAudioDescriptor(pub u32);

impl ShortAudioDescriptor {
    pub const REPORT_MARKER: u8 = 0x00;
    pub const ABORT_MARKER: u8 = 0xFA;

    /// Value held while a request is outstanding
    pub const UNKNOWN: ShortAudioDescriptor = ShortAudioDescriptor(0xFF00_0000);

    /// Descriptor from the three bytes of a report
    pub fn from_report(bytes: [u8; 3]) -> Self {
        Self(u32::from_be_bytes([
            Self::REPORT_MARKER,
            bytes[0],
            bytes[1],
            bytes[2],
        ]))
    }

    /// Descriptor from a feature abort: the echoing opcode plus its two operands
    pub fn from_feature_abort(opcode: u8, operands: [u8; 2]) -> Self {
        Self(u32::from_be_bytes([
            Self::ABORT_MARKER,
            opcode,
            operands[0],
            operands[1],
        ]))
    }

    pub fn marker(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The three bytes following the marker
    pub fn payload(&self) -> [u8; 3] {
        let [_, a, b, c] = self.0.to_be_bytes();
        [a, b, c]
    }

    pub fn is_abort_path(&self) -> bool {
        self.marker() == Self::ABORT_MARKER
    }

    /// Audio format code of a reported descriptor (bits 3-6 of the first byte)
    pub fn format_code(&self) -> Option<u8> {
        if self.marker() != Self::REPORT_MARKER {
            return None;
        }
        Some((self.payload()[0] >> 3) & 0x0F)
    }
}

impl Default for ShortAudioDescriptor {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for ShortAudioDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_status() {
        let status = AudioStatus(0x32);
        assert_eq!(status.volume(), Some(50));
        assert!(!status.is_muted());

        let muted = AudioStatus(0xB2);
        assert!(muted.is_muted());
        assert_eq!(muted.volume(), Some(50));
        assert_eq!(muted.to_string(), "50% (muted)");

        assert!(AudioStatus::UNKNOWN.is_unknown());
        assert_eq!(AudioStatus::new(150, true), AudioStatus(0x80 | 100));
        assert!(!AudioStatus::ARC_FORCED.is_unknown());
    }

    #[test]
    fn test_sad_encodings() {
        let reported = ShortAudioDescriptor::from_report([0x09, 0x07, 0x07]);
        assert_eq!(reported.0, 0x0009_0707);
        assert_eq!(reported.marker(), 0x00);
        assert_eq!(reported.format_code(), Some(1));
        assert!(!reported.is_abort_path());

        let aborted = ShortAudioDescriptor::from_feature_abort(0x00, [0xA4, 0x03]);
        assert_eq!(aborted.0, 0xFA00_A403);
        assert!(aborted.is_abort_path());
        assert_eq!(aborted.payload(), [0x00, 0xA4, 0x03]);
        assert_eq!(aborted.format_code(), None);
    }

    #[test]
    fn test_power_status() {
        assert!(PowerStatus::Standby.is_standby());
        assert!(PowerStatus::InTransitionOnToStandby.is_standby());
        assert!(!PowerStatus::InTransitionStandbyToOn.is_standby());
        assert_eq!(PowerStatus::try_from(0x99), Ok(PowerStatus::Unknown));
    }

    #[test]
    fn test_abort_reason_values() {
        assert_eq!(AbortReason::InvalidOperand.as_u8(), 3);
        assert_eq!(AbortReason::try_from(4), Ok(AbortReason::Refused));
        assert!(UserControlCode::PowerOffFunction.is_power_key());
        assert!(!UserControlCode::VolumeUp.is_power_key());
    }
}
