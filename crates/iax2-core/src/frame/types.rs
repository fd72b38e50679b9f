//! Frame type and subclass enumerations
//!
//! Numeric values are the ones IAX2 puts on the wire, so a codec outside this
//! crate can map bytes to these enums with `from_u8` and back with `as_u8`.

use std::fmt;

/// Full-frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Dtmf = 1,
    Voice = 2,
    Video = 3,
    Control = 4,
    Null = 5,
    Protocol = 6,
    Text = 7,
    Image = 8,
    Html = 9,
    Cng = 10,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Dtmf,
            2 => Self::Voice,
            3 => Self::Video,
            4 => Self::Control,
            5 => Self::Null,
            6 => Self::Protocol,
            7 => Self::Text,
            8 => Self::Image,
            9 => Self::Html,
            10 => Self::Cng,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Subclass of a protocol (type 6) full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCommand {
    New = 1,
    Ping = 2,
    Pong = 3,
    Ack = 4,
    Hangup = 5,
    Reject = 6,
    Accept = 7,
    AuthReq = 8,
    AuthRep = 9,
    Inval = 10,
    LagRq = 11,
    LagRp = 12,
    RegReq = 13,
    RegAuth = 14,
    RegAck = 15,
    RegRej = 16,
    RegRel = 17,
    Vnak = 18,
    DpReq = 19,
    DpRep = 20,
    Dial = 21,
    TxReq = 22,
    TxCnt = 23,
    TxAcc = 24,
    TxReady = 25,
    TxRel = 26,
    TxRej = 27,
    Quelch = 28,
    Unquelch = 29,
    Poke = 30,
    Page = 31,
    Mwi = 32,
    Unsupport = 33,
    Transfer = 34,
    Provision = 35,
    FwDownl = 36,
    FwData = 37,
}

impl ProtocolCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        use ProtocolCommand::*;
        Some(match value {
            1 => New,
            2 => Ping,
            3 => Pong,
            4 => Ack,
            5 => Hangup,
            6 => Reject,
            7 => Accept,
            8 => AuthReq,
            9 => AuthRep,
            10 => Inval,
            11 => LagRq,
            12 => LagRp,
            13 => RegReq,
            14 => RegAuth,
            15 => RegAck,
            16 => RegRej,
            17 => RegRel,
            18 => Vnak,
            19 => DpReq,
            20 => DpRep,
            21 => Dial,
            22 => TxReq,
            23 => TxCnt,
            24 => TxAcc,
            25 => TxReady,
            26 => TxRel,
            27 => TxRej,
            28 => Quelch,
            29 => Unquelch,
            30 => Poke,
            31 => Page,
            32 => Mwi,
            33 => Unsupport,
            34 => Transfer,
            35 => Provision,
            36 => FwDownl,
            37 => FwData,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Upper-case protocol name
    pub fn name(self) -> &'static str {
        use ProtocolCommand::*;
        match self {
            New => "NEW",
            Ping => "PING",
            Pong => "PONG",
            Ack => "ACK",
            Hangup => "HANGUP",
            Reject => "REJECT",
            Accept => "ACCEPT",
            AuthReq => "AUTHREQ",
            AuthRep => "AUTHREP",
            Inval => "INVAL",
            LagRq => "LAGRQ",
            LagRp => "LAGRP",
            RegReq => "REGREQ",
            RegAuth => "REGAUTH",
            RegAck => "REGACK",
            RegRej => "REGREJ",
            RegRel => "REGREL",
            Vnak => "VNAK",
            DpReq => "DPREQ",
            DpRep => "DPREP",
            Dial => "DIAL",
            TxReq => "TXREQ",
            TxCnt => "TXCNT",
            TxAcc => "TXACC",
            TxReady => "TXREADY",
            TxRel => "TXREL",
            TxRej => "TXREJ",
            Quelch => "QUELCH",
            Unquelch => "UNQUELCH",
            Poke => "POKE",
            Page => "PAGE",
            Mwi => "MWI",
            Unsupport => "UNSUPPORT",
            Transfer => "TRANSFER",
            Provision => "PROVISION",
            FwDownl => "FWDOWNL",
            FwData => "FWDATA",
        }
    }
}

impl fmt::Display for ProtocolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subclass of a session control (type 4) full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionControl {
    Hangup,
    Ring,
    Ringing,
    Answer,
    Busy,
    TakeOffHook,
    OffHook,
    Congestion,
    FlashHook,
    Wink,
    Option,
    KeyRadio,
    UnkeyRadio,
    Progress,
    Proceeding,
    Hold,
    HoldRelease,
    StopSounds,
}

impl SessionControl {
    pub fn from_u8(value: u8) -> Option<Self> {
        use SessionControl::*;
        Some(match value {
            1 => Hangup,
            2 => Ring,
            3 => Ringing,
            4 => Answer,
            5 => Busy,
            6 => TakeOffHook,
            7 => OffHook,
            8 => Congestion,
            9 => FlashHook,
            10 => Wink,
            11 => Option,
            12 => KeyRadio,
            13 => UnkeyRadio,
            14 => Progress,
            15 => Proceeding,
            16 => Hold,
            17 => HoldRelease,
            255 => StopSounds,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        use SessionControl::*;
        match self {
            Hangup => 1,
            Ring => 2,
            Ringing => 3,
            Answer => 4,
            Busy => 5,
            TakeOffHook => 6,
            OffHook => 7,
            Congestion => 8,
            FlashHook => 9,
            Wink => 10,
            Option => 11,
            KeyRadio => 12,
            UnkeyRadio => 13,
            Progress => 14,
            Proceeding => 15,
            Hold => 16,
            HoldRelease => 17,
            StopSounds => 255,
        }
    }
}

/// Media carried by a mini frame or a media full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_command_values() {
        for value in 1..=37u8 {
            let cmd = ProtocolCommand::from_u8(value).expect("defined subclass");
            assert_eq!(cmd.as_u8(), value);
        }
        assert_eq!(ProtocolCommand::from_u8(0), None);
        assert_eq!(ProtocolCommand::from_u8(38), None);
        assert_eq!(ProtocolCommand::Ack.to_string(), "ACK");
    }

    #[test]
    fn test_session_control_values() {
        assert_eq!(SessionControl::from_u8(255), Some(SessionControl::StopSounds));
        assert_eq!(SessionControl::Answer.as_u8(), 4);
        assert_eq!(SessionControl::from_u8(18), None);
    }
}
