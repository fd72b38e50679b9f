//! Media format identifiers carried in FORMAT and CAPABILITY information elements.
//!
//! Formats are single bits; a capability is the union of the bits a peer can
//! handle. Choosing among them is call-control's business, this module only
//! names the values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single media format (one bit of the IAX2 format mask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecFormat(u32);

impl CodecFormat {
    pub const G723_1: CodecFormat = CodecFormat(0x0000_0001);
    pub const GSM: CodecFormat = CodecFormat(0x0000_0002);
    pub const ULAW: CodecFormat = CodecFormat(0x0000_0004);
    pub const ALAW: CodecFormat = CodecFormat(0x0000_0008);
    pub const MP3: CodecFormat = CodecFormat(0x0000_0010);
    pub const ADPCM: CodecFormat = CodecFormat(0x0000_0020);
    pub const SLINEAR: CodecFormat = CodecFormat(0x0000_0040);
    pub const LPC10: CodecFormat = CodecFormat(0x0000_0080);
    pub const G729: CodecFormat = CodecFormat(0x0000_0100);
    pub const SPEEX: CodecFormat = CodecFormat(0x0000_0200);
    pub const ILBC: CodecFormat = CodecFormat(0x0000_0400);

    pub const JPEG: CodecFormat = CodecFormat(0x0001_0000);
    pub const PNG: CodecFormat = CodecFormat(0x0002_0000);
    pub const H261: CodecFormat = CodecFormat(0x0004_0000);
    pub const H263: CodecFormat = CodecFormat(0x0008_0000);

    /// Wrap a raw format value. Returns `None` unless exactly one bit is set.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits.count_ones() == 1 {
            Some(CodecFormat(bits))
        } else {
            None
        }
    }

    /// Raw bit value
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True for the audio range of the mask
    pub fn is_audio(self) -> bool {
        self.0 < 0x0001_0000
    }

    /// True for the video range of the mask
    pub fn is_video(self) -> bool {
        !self.is_audio()
    }

    /// Short codec name, as used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::G723_1 => "G.723.1",
            Self::GSM => "GSM",
            Self::ULAW => "G.711-uLaw",
            Self::ALAW => "G.711-ALaw",
            Self::MP3 => "MP3",
            Self::ADPCM => "ADPCM",
            Self::SLINEAR => "SLinear",
            Self::LPC10 => "LPC10",
            Self::G729 => "G.729",
            Self::SPEEX => "Speex",
            Self::ILBC => "iLBC",
            Self::JPEG => "JPEG",
            Self::PNG => "PNG",
            Self::H261 => "H.261",
            Self::H263 => "H.263",
            _ => "unknown",
        }
    }
}

impl fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.0)
    }
}

/// A set of media formats (the CAPABILITY mask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecSet(u32);

impl CodecSet {
    pub const EMPTY: CodecSet = CodecSet(0);

    pub fn from_bits(bits: u32) -> Self {
        CodecSet(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, format: CodecFormat) -> bool {
        self.0 & format.bits() != 0
    }

    pub fn with(self, format: CodecFormat) -> Self {
        CodecSet(self.0 | format.bits())
    }

    pub fn intersection(self, other: CodecSet) -> Self {
        CodecSet(self.0 & other.0)
    }

    /// Formats in the set, lowest bit first
    pub fn iter(self) -> impl Iterator<Item = CodecFormat> {
        (0..32u32)
            .map(|bit| 1u32 << bit)
            .filter(move |bits| self.0 & bits != 0)
            .map(CodecFormat)
    }
}

impl FromIterator<CodecFormat> for CodecSet {
    fn from_iter<I: IntoIterator<Item = CodecFormat>>(iter: I) -> Self {
        iter.into_iter().fold(CodecSet::EMPTY, |set, f| set.with(f))
    }
}

/// What this endpoint advertises in NEW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPreferences {
    /// Format placed in the FORMAT IE
    pub preferred: CodecFormat,
    /// Formats placed in the CAPABILITY IE
    pub supported: CodecSet,
}

impl Default for CodecPreferences {
    fn default() -> Self {
        Self {
            preferred: CodecFormat::ULAW,
            supported: [CodecFormat::ULAW, CodecFormat::ALAW, CodecFormat::GSM]
                .into_iter()
                .collect(),
        }
    }
}

/// The remote side's view of media, as read from NEW or ACCEPT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecOffer {
    /// FORMAT IE, when present
    pub format: Option<CodecFormat>,
    /// CAPABILITY IE, empty when absent
    pub capability: CodecSet,
}

impl CodecOffer {
    /// Pick a codec the way an endpoint with `local` support would:
    /// the remote's preferred format when we support it, otherwise the
    /// lowest common bit.
    pub fn negotiate(&self, local: CodecSet) -> Option<CodecFormat> {
        if let Some(format) = self.format {
            if local.contains(format) {
                return Some(format);
            }
        }
        self.capability.intersection(local).iter().next()
    }
}
