//! Inbound frame classification
//!
//! The dispatcher is the first thing an inbound frame meets inside a
//! processor. It decides whether the frame is media, an acknowledgement, or a
//! sequenced full frame, and for sequenced frames whether it may be applied now.
//!
//! Sequenced full frames are applied strictly in `in_seq` order:
//!
//! - the expected frame is applied, followed by any held frames it unblocks
//! - an early frame is held (up to the reorder window) and acknowledged
//! - a duplicate is acknowledged again and never applied
//! - an early frame that does not fit in the window is dropped without an
//!   acknowledgement so the peer sends it again
//!
//! Held frames are acknowledged on arrival, so when they are finally applied
//! they are flagged as not needing another ACK.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::frame::{Frame, FrameKind, FullFrame, MediaKind, ProtocolCommand, reconstruct_timestamp};
use crate::reliability::{InboundClass, SequenceTracker};

/// Coordinates an outbound ACK must echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckTarget {
    pub timestamp: u32,
    pub out_seq: u8,
}

impl AckTarget {
    pub fn of(frame: &FullFrame) -> Self {
        Self {
            timestamp: frame.timestamp,
            out_seq: frame.sequence.out_seq,
        }
    }
}

/// A sequenced full frame cleared for handling
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFull {
    pub frame: FullFrame,
    /// False for frames that were acknowledged when they were held
    pub needs_ack: bool,
}

/// Media from a mini frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMedia {
    pub kind: MediaKind,
    /// Reconstructed 32-bit timestamp
    pub timestamp: u32,
    pub payload: Bytes,
}

/// Outcome of dispatching one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Mini-frame media, no state effect
    Media(InboundMedia),
    /// ACK to match against the pending record
    Ack(FullFrame),
    /// Peer reports missing frames
    Vnak(FullFrame),
    /// Frames to handle, in order
    Apply(Vec<InboundFull>),
    /// Acknowledge only: duplicate or held early frame
    AckOnly(AckTarget),
    /// Dropped without acknowledgement
    Dropped,
}

#[derive(Debug)]
pub struct FrameDispatcher {
    sequence: SequenceTracker,
    held: HashMap<u8, FullFrame>,
    reorder_window: usize,
    last_full_timestamp: u32,
}

impl FrameDispatcher {
    pub fn new(sequence: SequenceTracker, reorder_window: u8) -> Self {
        Self {
            sequence,
            held: HashMap::new(),
            reorder_window: usize::from(reorder_window),
            last_full_timestamp: 0,
        }
    }

    pub fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }

    /// Outbound frames are stamped through the same tracker
    pub fn sequence_mut(&mut self) -> &mut SequenceTracker {
        &mut self.sequence
    }

    /// Number of early frames currently held
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Base used to rebuild mini-frame timestamps
    pub fn last_full_timestamp(&self) -> u32 {
        self.last_full_timestamp
    }

    pub fn dispatch(&mut self, frame: Frame) -> Dispatch {
        match frame {
            Frame::Mini(mini) => {
                let timestamp = reconstruct_timestamp(self.last_full_timestamp, mini.timestamp);
                Dispatch::Media(InboundMedia {
                    kind: mini.media,
                    timestamp,
                    payload: mini.payload,
                })
            }
            Frame::Full(full) => self.dispatch_full(full),
        }
    }

    fn dispatch_full(&mut self, full: FullFrame) -> Dispatch {
        match full.kind {
            // These echo our own timestamps, so they must not move the media base
            FrameKind::Protocol(ProtocolCommand::Ack) => return Dispatch::Ack(full),
            FrameKind::Protocol(ProtocolCommand::Vnak) => return Dispatch::Vnak(full),
            _ => {}
        }

        let seq = full.sequence.out_seq;
        match self.sequence.classify_inbound(seq) {
            InboundClass::Expected => {
                self.note_timestamp(&full);
                self.sequence.accept_inbound();
                let mut ready = vec![InboundFull {
                    frame: full,
                    needs_ack: true,
                }];
                while let Some(next) = self.held.remove(&self.sequence.in_seq()) {
                    trace!(seq = next.sequence.out_seq, "releasing held frame");
                    self.note_timestamp(&next);
                    self.sequence.accept_inbound();
                    ready.push(InboundFull {
                        frame: next,
                        needs_ack: false,
                    });
                }
                Dispatch::Apply(ready)
            }
            InboundClass::Early(distance) => {
                let target = AckTarget::of(&full);
                if self.held.contains_key(&seq) {
                    trace!(seq, "early frame already held");
                    return Dispatch::AckOnly(target);
                }
                if self.held.len() >= self.reorder_window {
                    debug!(seq, distance, held = self.held.len(), "reorder window full, dropping early frame");
                    return Dispatch::Dropped;
                }
                trace!(seq, distance, expected = self.sequence.in_seq(), "holding early frame");
                self.held.insert(seq, full);
                Dispatch::AckOnly(target)
            }
            InboundClass::Duplicate => {
                trace!(seq, expected = self.sequence.in_seq(), "duplicate frame");
                Dispatch::AckOnly(AckTarget::of(&full))
            }
        }
    }

    /// Move the mini-frame base to an applied frame's timestamp. PONG and
    /// LAGRP carry the timestamp of our own probe, not the peer's clock.
    fn note_timestamp(&mut self, frame: &FullFrame) {
        if matches!(
            frame.kind,
            FrameKind::Protocol(ProtocolCommand::Pong) | FrameKind::Protocol(ProtocolCommand::LagRp)
        ) {
            return;
        }
        self.last_full_timestamp = frame.timestamp;
    }

    /// Forget held frames; nothing will be applied after termination
    pub fn clear_held(&mut self) {
        self.held.clear();
    }
}
