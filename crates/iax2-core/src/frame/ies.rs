//! Information elements attached to protocol frames
//!
//! Only the decoded values are modelled; how they are laid out on the wire
//! belongs to the frame codec.

use super::codec::{CodecFormat, CodecOffer, CodecSet};

/// Authentication methods offered in an AUTHREQ or REGAUTH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthMethods(u16);

impl AuthMethods {
    pub const PLAINTEXT: AuthMethods = AuthMethods(0x0001);
    pub const MD5: AuthMethods = AuthMethods(0x0002);
    pub const RSA: AuthMethods = AuthMethods(0x0004);

    pub fn from_bits(bits: u16) -> Self {
        AuthMethods(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, other: AuthMethods) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn union(self, other: AuthMethods) -> Self {
        AuthMethods(self.0 | other.0)
    }
}

/// Encryption methods offered in an AUTHREQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncryptionMethods(u16);

impl EncryptionMethods {
    pub const AES128: EncryptionMethods = EncryptionMethods(0x0001);

    pub fn from_bits(bits: u16) -> Self {
        EncryptionMethods(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn supports_aes128(self) -> bool {
        self.0 & Self::AES128.0 != 0
    }
}

/// Q.931 style cause codes used in HANGUP and REJECT
pub mod cause_code {
    pub const UNALLOCATED_NUMBER: u8 = 1;
    pub const NORMAL_CLEARING: u8 = 16;
    pub const USER_BUSY: u8 = 17;
    pub const NO_USER_RESPONSE: u8 = 18;
    pub const NO_ANSWER: u8 = 19;
    pub const CALL_REJECTED: u8 = 21;
    pub const DESTINATION_OUT_OF_ORDER: u8 = 27;
    pub const NORMAL_CIRCUIT_CONGESTION: u8 = 34;
    pub const BEARER_CAPABILITY_NOT_AVAIL: u8 = 58;
    pub const FACILITY_REJECTED: u8 = 29;
}

/// Protocol version placed in NEW
pub const PROTOCOL_VERSION: u16 = 2;

/// Decoded information elements of a full frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InformationElements {
    pub called_number: Option<String>,
    pub calling_number: Option<String>,
    pub calling_name: Option<String>,
    pub called_context: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dnid: Option<String>,
    pub capability: Option<CodecSet>,
    pub format: Option<u32>,
    pub version: Option<u16>,
    pub auth_methods: Option<AuthMethods>,
    pub challenge: Option<String>,
    pub md5_result: Option<String>,
    pub cause: Option<String>,
    pub cause_code: Option<u8>,
    pub encryption: Option<EncryptionMethods>,
    pub refresh: Option<u16>,
    pub music_on_hold: bool,
    pub unknown_command: Option<u8>,
}

impl InformationElements {
    pub fn new() -> Self {
        Self::default()
    }

    /// IEs carrying a hangup/reject cause
    pub fn with_cause(cause: impl Into<String>, code: Option<u8>) -> Self {
        Self {
            cause: Some(cause.into()),
            cause_code: code,
            ..Default::default()
        }
    }

    /// The remote media offer carried by NEW or ACCEPT
    pub fn codec_offer(&self) -> CodecOffer {
        CodecOffer {
            format: self.format.and_then(CodecFormat::from_bits),
            capability: self.capability.unwrap_or_default(),
        }
    }

    /// True when the frame carried neither FORMAT nor CAPABILITY
    pub fn has_codec_offer(&self) -> bool {
        self.format.is_some() || self.capability.is_some()
    }
}
