//! CEC opcodes
//!
//! The opcode is the first byte after the header and selects how the rest of
//! the frame is interpreted. A frame with a header but no opcode is a poll.

use crate::macros::open_byte_enum;

open_byte_enum! {
    /// Operation codes; bytes outside this table decode as `Opcode::Unknown`
    pub enum Opcode {
        FeatureAbort = 0x00 => "feature abort",
        ImageViewOn = 0x04 => "image view on",
        TunerStepIncrement = 0x05 => "tuner step increment",
        TunerStepDecrement = 0x06 => "tuner step decrement",
        TunerDeviceStatus = 0x07 => "tuner device status",
        GiveTunerDeviceStatus = 0x08 => "give tuner device status",
        RecordOn = 0x09 => "record on",
        RecordStatus = 0x0A => "record status",
        RecordOff = 0x0B => "record off",
        TextViewOn = 0x0D => "text view on",
        RecordTvScreen = 0x0F => "record tv screen",
        GiveDeckStatus = 0x1A => "give deck status",
        DeckStatus = 0x1B => "deck status",
        SetMenuLanguage = 0x32 => "set menu language",
        ClearAnalogueTimer = 0x33 => "clear analogue timer",
        SetAnalogueTimer = 0x34 => "set analogue timer",
        TimerStatus = 0x35 => "timer status",
        Standby = 0x36 => "standby",
        Play = 0x41 => "play",
        DeckControl = 0x42 => "deck control",
        TimerClearedStatus = 0x43 => "timer cleared status",
        UserControlPressed = 0x44 => "user control pressed",
        UserControlRelease = 0x45 => "user control release",
        GiveOsdName = 0x46 => "give osd name",
        SetOsdName = 0x47 => "set osd name",
        SetOsdString = 0x64 => "set osd string",
        SetTimerProgramTitle = 0x67 => "set timer program title",
        SystemAudioModeRequest = 0x70 => "system audio mode request",
        GiveAudioStatus = 0x71 => "give audio status",
        SetSystemAudioMode = 0x72 => "set system audio mode",
        ReportAudioStatus = 0x7A => "report audio status",
        GiveSystemAudioModeStatus = 0x7D => "give system audio mode status",
        SystemAudioModeStatus = 0x7E => "system audio mode status",
        RoutingChange = 0x80 => "routing change",
        RoutingInformation = 0x81 => "routing information",
        ActiveSource = 0x82 => "active source",
        GivePhysicalAddress = 0x83 => "give physical address",
        ReportPhysicalAddress = 0x84 => "report physical address",
        RequestActiveSource = 0x85 => "request active source",
        SetStreamPath = 0x86 => "set stream path",
        DeviceVendorId = 0x87 => "device vendor id",
        VendorCommand = 0x89 => "vendor command",
        VendorRemoteButtonDown = 0x8A => "vendor remote button down",
        VendorRemoteButtonUp = 0x8B => "vendor remote button up",
        GiveDeviceVendorId = 0x8C => "give device vendor id",
        MenuRequest = 0x8D => "menu request",
        MenuStatus = 0x8E => "menu status",
        GiveDevicePowerStatus = 0x8F => "give device power status",
        ReportPowerStatus = 0x90 => "report power status",
        GetMenuLanguage = 0x91 => "get menu language",
        SelectAnalogueService = 0x92 => "select analogue service",
        SelectDigitalService = 0x93 => "select digital service",
        SetDigitalTimer = 0x97 => "set digital timer",
        ClearDigitalTimer = 0x99 => "clear digital timer",
        SetAudioRate = 0x9A => "set audio rate",
        InactiveSource = 0x9D => "inactive source",
        CecVersion = 0x9E => "cec version",
        GetCecVersion = 0x9F => "get cec version",
        VendorCommandWithId = 0xA0 => "vendor command with id",
        ClearExternalTimer = 0xA1 => "clear external timer",
        SetExternalTimer = 0xA2 => "set external timer",
        ReportShortAudioDescriptor = 0xA3 => "report short audio descriptor",
        RequestShortAudioDescriptor = 0xA4 => "request short audio descriptor",
        StartArc = 0xC0 => "start arc",
        ReportArcStarted = 0xC1 => "report arc started",
        ReportArcEnded = 0xC2 => "report arc ended",
        RequestArcStart = 0xC3 => "request arc start",
        RequestArcEnd = 0xC4 => "request arc end",
        EndArc = 0xC5 => "end arc",
        Cdc = 0xF8 => "cdc",
        Abort = 0xFF => "abort",
    }
    unknown Unknown;
}

impl Opcode {
    /// Whether this opcode asks the destination for information
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Opcode::GiveTunerDeviceStatus
                | Opcode::GiveDeckStatus
                | Opcode::GiveOsdName
                | Opcode::SystemAudioModeRequest
                | Opcode::GiveAudioStatus
                | Opcode::GiveSystemAudioModeStatus
                | Opcode::GivePhysicalAddress
                | Opcode::RequestActiveSource
                | Opcode::GiveDeviceVendorId
                | Opcode::MenuRequest
                | Opcode::GiveDevicePowerStatus
                | Opcode::GetMenuLanguage
                | Opcode::GetCecVersion
                | Opcode::RequestShortAudioDescriptor
                | Opcode::RequestArcStart
                | Opcode::RequestArcEnd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseError;

    #[test]
    fn test_opcode_values() {
        assert_eq!(Opcode::try_from(0x72), Ok(Opcode::SetSystemAudioMode));
        assert_eq!(Opcode::try_from(0xA4), Ok(Opcode::RequestShortAudioDescriptor));
        assert_eq!(u8::from(Opcode::StartArc), 0xC0);
        assert_eq!(Opcode::EndArc.as_u8(), 0xC5);
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            Opcode::try_from(0x01),
            Err(ParseError::InvalidValue {
                kind: "Opcode",
                value: 0x01
            })
        );
    }

    #[test]
    fn test_unlisted_byte_is_kept() {
        let give_features = Opcode::from_u8(0xA5);
        assert_eq!(give_features, Opcode::Unknown(0xA5));
        assert!(!give_features.is_known());
        assert_eq!(give_features.as_u8(), 0xA5);
        assert_eq!(give_features.to_string(), "unknown (0xa5)");
        assert_eq!(Opcode::from_u8(0x82), Opcode::ActiveSource);
        assert!(!give_features.is_request());
    }

    #[test]
    fn test_opcode_classification() {
        assert!(Opcode::GiveAudioStatus.is_request());
        assert!(!Opcode::ReportAudioStatus.is_request());
        assert_eq!(Opcode::ReportArcStarted.to_string(), "report arc started");
    }
}
