//! In-memory IAX2 frame model
//!
//! The processor never sees bytes. An external codec turns datagrams into
//! [`Frame`] values (and back), and this module describes what those values
//! carry: the remote endpoint, sequence numbers, timestamp, the frame kind and
//! the decoded information elements.
//!
//! Two shapes exist on the wire:
//!
//! - **Full frames** carry both sequence numbers and a type/subclass pair.
//!   Every full frame except ACK and VNAK advances the receiver's inbound
//!   sequence number and must be acknowledged.
//! - **Mini frames** carry only media, the source call number and the low 16
//!   bits of the timestamp. The full timestamp is rebuilt from the last full
//!   frame seen on the call, see [`reconstruct_timestamp`].

pub mod codec;
pub mod ies;
pub mod types;

use std::net::SocketAddr;

use bytes::Bytes;

use crate::call::CallToken;

pub use codec::{CodecFormat, CodecOffer, CodecPreferences, CodecSet};
pub use ies::{AuthMethods, EncryptionMethods, InformationElements, cause_code};
pub use types::{FrameType, MediaKind, ProtocolCommand, SessionControl};

/// Addressing part of a full frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteInfo {
    /// Network address of the far end
    pub address: SocketAddr,
    /// Call number chosen by the sender of the frame
    pub source_call_number: u16,
    /// Call number of the receiver; zero on a NEW
    pub dest_call_number: u16,
}

impl RemoteInfo {
    pub fn new(address: SocketAddr, source_call_number: u16, dest_call_number: u16) -> Self {
        Self {
            address,
            source_call_number,
            dest_call_number,
        }
    }
}

/// Sequence numbers of a full frame, both 8-bit and wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceInfo {
    /// Sender's outbound sequence number
    pub out_seq: u8,
    /// Next sequence number the sender expects from us
    pub in_seq: u8,
}

/// Type and subclass of a full frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// One DTMF digit
    Dtmf(char),
    Voice(CodecFormat),
    Video(CodecFormat),
    Control(SessionControl),
    Null,
    Protocol(ProtocolCommand),
    Text,
    Image(CodecFormat),
    Html,
    /// Comfort noise, level in the subclass
    Cng(u8),
}

impl FrameKind {
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameKind::Dtmf(_) => FrameType::Dtmf,
            FrameKind::Voice(_) => FrameType::Voice,
            FrameKind::Video(_) => FrameType::Video,
            FrameKind::Control(_) => FrameType::Control,
            FrameKind::Null => FrameType::Null,
            FrameKind::Protocol(_) => FrameType::Protocol,
            FrameKind::Text => FrameType::Text,
            FrameKind::Image(_) => FrameType::Image,
            FrameKind::Html => FrameType::Html,
            FrameKind::Cng(_) => FrameType::Cng,
        }
    }
}

/// A full frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullFrame {
    pub remote: RemoteInfo,
    pub sequence: SequenceInfo,
    /// Milliseconds since the start of the call, as stamped by the sender
    pub timestamp: u32,
    pub kind: FrameKind,
    pub ies: InformationElements,
    /// Media or text payload; empty for protocol frames
    pub payload: Bytes,
    /// Set by the sender when the frame is a retransmission
    pub retransmission: bool,
}

impl FullFrame {
    /// Build a frame with zeroed sequence numbers and timestamp.
    ///
    /// Outbound frames get both stamped by the processor just before they are
    /// handed to the transmitter.
    pub fn new(remote: RemoteInfo, kind: FrameKind) -> Self {
        Self {
            remote,
            sequence: SequenceInfo::default(),
            timestamp: 0,
            kind,
            ies: InformationElements::default(),
            payload: Bytes::new(),
            retransmission: false,
        }
    }

    /// Shorthand for a protocol (type 6) frame
    pub fn protocol(remote: RemoteInfo, command: ProtocolCommand) -> Self {
        Self::new(remote, FrameKind::Protocol(command))
    }

    pub fn with_ies(mut self, ies: InformationElements) -> Self {
        self.ies = ies;
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sequence(mut self, out_seq: u8, in_seq: u8) -> Self {
        self.sequence = SequenceInfo { out_seq, in_seq };
        self
    }

    /// The protocol subclass, when this is a protocol frame
    pub fn command_subtype(&self) -> Option<ProtocolCommand> {
        match self.kind {
            FrameKind::Protocol(cmd) => Some(cmd),
            _ => None,
        }
    }

    pub fn is_command(&self, command: ProtocolCommand) -> bool {
        self.command_subtype() == Some(command)
    }

    /// ACK and VNAK leave the receiver's inbound sequence number untouched
    pub fn increments_in_seq(&self) -> bool {
        !matches!(
            self.command_subtype(),
            Some(ProtocolCommand::Ack) | Some(ProtocolCommand::Vnak)
        )
    }

    pub fn sequence_numbers(&self) -> SequenceInfo {
        self.sequence
    }

    /// Key of the call this frame belongs to, seen from the receiver
    pub fn call_token(&self) -> CallToken {
        CallToken::new(self.remote.address, self.remote.source_call_number)
    }

    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}

/// A mini frame: media only, 16-bit timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniFrame {
    pub address: SocketAddr,
    pub source_call_number: u16,
    pub timestamp: u16,
    pub media: MediaKind,
    pub payload: Bytes,
}

/// One inbound or outbound unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Full(FullFrame),
    Mini(MiniFrame),
}

impl Frame {
    pub fn is_full_frame(&self) -> bool {
        matches!(self, Frame::Full(_))
    }

    /// Raw timestamp as carried; mini frames only hold the low 16 bits
    pub fn timestamp(&self) -> u32 {
        match self {
            Frame::Full(full) => full.timestamp,
            Frame::Mini(mini) => u32::from(mini.timestamp),
        }
    }

    pub fn sequence_numbers(&self) -> Option<SequenceInfo> {
        match self {
            Frame::Full(full) => Some(full.sequence),
            Frame::Mini(_) => None,
        }
    }

    pub fn command_subtype(&self) -> Option<ProtocolCommand> {
        match self {
            Frame::Full(full) => full.command_subtype(),
            Frame::Mini(_) => None,
        }
    }

    /// Remote address plus the remote's source call number
    pub fn remote_endpoint_key(&self) -> CallToken {
        match self {
            Frame::Full(full) => full.call_token(),
            Frame::Mini(mini) => CallToken::new(mini.address, mini.source_call_number),
        }
    }

    pub fn address(&self) -> SocketAddr {
        match self {
            Frame::Full(full) => full.remote.address,
            Frame::Mini(mini) => mini.address,
        }
    }

    /// Destination call number; mini frames do not carry one
    pub fn dest_call_number(&self) -> Option<u16> {
        match self {
            Frame::Full(full) => Some(full.remote.dest_call_number),
            Frame::Mini(_) => None,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Frame::Full(full) => full.byte_len(),
            Frame::Mini(mini) => mini.payload.len(),
        }
    }
}

impl From<FullFrame> for Frame {
    fn from(frame: FullFrame) -> Self {
        Frame::Full(frame)
    }
}

impl From<MiniFrame> for Frame {
    fn from(frame: MiniFrame) -> Self {
        Frame::Mini(frame)
    }
}

/// Rebuild a 32-bit timestamp from a mini frame's low 16 bits.
///
/// The high half comes from the last full frame. When the result lands more
/// than half a wrap behind that base the low half has rolled over since, and
/// one 0x10000 is added.
pub fn reconstruct_timestamp(last_full: u32, mini: u16) -> u32 {
    let candidate = (last_full & 0xffff_0000) | u32::from(mini);
    if last_full.wrapping_sub(candidate) > 0x8000 && candidate < last_full {
        candidate.wrapping_add(0x1_0000)
    } else {
        candidate
    }
}
