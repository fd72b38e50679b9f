//! Sequence numbering for full frames
//!
//! Both counters are 8-bit and wrap. `in_seq` is the next sequence number we
//! expect from the peer (one past the last frame applied), which is also the
//! value every outbound full frame carries as its implicit acknowledgement.
//! `out_seq` is the number the next outbound frame will carry.

use tracing::trace;

use crate::frame::{FrameKind, FullFrame, ProtocolCommand};

/// Furthest a frame may be ahead of `in_seq` and still count as early
pub const MAX_EARLY_DISTANCE: u8 = 127;

/// Where an inbound sequence number sits relative to what we expect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundClass {
    /// Exactly the next expected number
    Expected,
    /// Ahead of the expected number by this many frames
    Early(u8),
    /// Already applied
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    in_seq: u8,
    out_seq: u8,
    last_timestamp: Option<u32>,
    min_timestamp_step: u32,
}

impl SequenceTracker {
    pub fn new(min_timestamp_step: u32) -> Self {
        Self {
            in_seq: 0,
            out_seq: 0,
            last_timestamp: None,
            min_timestamp_step,
        }
    }

    /// Next inbound sequence number we expect
    pub fn in_seq(&self) -> u8 {
        self.in_seq
    }

    /// Sequence number the next outbound frame will carry
    pub fn out_seq(&self) -> u8 {
        self.out_seq
    }

    /// Classify an inbound full frame's `out_seq` using modular distance
    pub fn classify_inbound(&self, seq: u8) -> InboundClass {
        match seq.wrapping_sub(self.in_seq) {
            0 => InboundClass::Expected,
            distance if distance <= MAX_EARLY_DISTANCE => InboundClass::Early(distance),
            _ => InboundClass::Duplicate,
        }
    }

    /// Record that the expected frame was applied
    pub fn accept_inbound(&mut self) {
        self.in_seq = self.in_seq.wrapping_add(1);
    }

    /// Stamp an outbound full frame with sequence numbers and a timestamp.
    ///
    /// `now_ms` is the call-relative clock. Protocol and control frames never
    /// reuse or go back on the last stamped timestamp and are pushed forward
    /// by at least the configured step. NEW is exempt. Media frames keep the
    /// timestamp they were built with, and ACK, PONG and LAGRP keep the one they
    /// echo. An ACK also keeps its echoed `out_seq` and does not consume a number.
    ///
    /// Returns the `out_seq` the frame carries.
    pub fn stamp_outbound(&mut self, frame: &mut FullFrame, now_ms: u32) -> u8 {
        frame.sequence.in_seq = self.in_seq;

        if frame.is_command(ProtocolCommand::Ack) {
            return frame.sequence.out_seq;
        }

        match frame.kind {
            FrameKind::Voice(_)
            | FrameKind::Video(_)
            | FrameKind::Protocol(ProtocolCommand::Pong)
            | FrameKind::Protocol(ProtocolCommand::LagRp) => {}
            FrameKind::Protocol(ProtocolCommand::New) => {
                frame.timestamp = now_ms;
                self.last_timestamp = Some(now_ms);
            }
            _ => {
                let mut timestamp = now_ms;
                if let Some(last) = self.last_timestamp {
                    let floor = last.wrapping_add(self.min_timestamp_step);
                    if timestamp < floor {
                        timestamp = floor;
                    }
                }
                frame.timestamp = timestamp;
                self.last_timestamp = Some(timestamp);
            }
        }

        let seq = self.out_seq;
        frame.sequence.out_seq = seq;
        self.out_seq = self.out_seq.wrapping_add(1);
        trace!(out_seq = seq, in_seq = self.in_seq, ts = frame.timestamp, "stamped outbound frame");
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CodecFormat, RemoteInfo};

    fn frame(kind: FrameKind) -> FullFrame {
        FullFrame::new(RemoteInfo::new("127.0.0.1:4569".parse().unwrap(), 1, 2), kind)
    }

    #[test]
    fn test_classification_wraps() {
        let mut tracker = SequenceTracker::new(3);
        for _ in 0..250 {
            tracker.accept_inbound();
        }
        assert_eq!(tracker.in_seq(), 250);
        assert_eq!(tracker.classify_inbound(250), InboundClass::Expected);
        assert_eq!(tracker.classify_inbound(2), InboundClass::Early(8));
        assert_eq!(tracker.classify_inbound(249), InboundClass::Duplicate);
        assert_eq!(tracker.classify_inbound(130), InboundClass::Duplicate);
    }

    #[test]
    fn test_out_seq_wraps() {
        let mut tracker = SequenceTracker::new(3);
        let stamped: Vec<u8> = (0..300u32)
            .map(|i| {
                let mut f = frame(FrameKind::Protocol(ProtocolCommand::Ping));
                tracker.stamp_outbound(&mut f, i * 10)
            })
            .collect();
        assert_eq!(stamped[255], 255);
        assert_eq!(stamped[256], 0);
        assert_eq!(stamped[299], (299 % 256) as u8);
        assert_eq!(tracker.out_seq(), (300 % 256) as u8);
    }

    #[test]
    fn test_timestamp_floor_and_new_exemption() {
        let mut tracker = SequenceTracker::new(3);
        let mut new = frame(FrameKind::Protocol(ProtocolCommand::New));
        tracker.stamp_outbound(&mut new, 0);
        assert_eq!(new.timestamp, 0);

        let mut first = frame(FrameKind::Protocol(ProtocolCommand::Ping));
        tracker.stamp_outbound(&mut first, 0);
        assert_eq!(first.timestamp, 3);

        let mut second = frame(FrameKind::Protocol(ProtocolCommand::LagRq));
        tracker.stamp_outbound(&mut second, 1);
        assert_eq!(second.timestamp, 6);

        let mut later = frame(FrameKind::Text);
        tracker.stamp_outbound(&mut later, 500);
        assert_eq!(later.timestamp, 500);

        let mut voice = frame(FrameKind::Voice(CodecFormat::ULAW)).with_timestamp(480);
        tracker.stamp_outbound(&mut voice, 501);
        assert_eq!(voice.timestamp, 480);
    }

    #[test]
    fn test_ack_keeps_echoed_coordinates() {
        let mut tracker = SequenceTracker::new(3);
        tracker.accept_inbound();
        let mut ack = frame(FrameKind::Protocol(ProtocolCommand::Ack))
            .with_timestamp(1234)
            .with_sequence(0, 0);
        let seq = tracker.stamp_outbound(&mut ack, 9999);
        assert_eq!(seq, 0);
        assert_eq!(ack.timestamp, 1234);
        assert_eq!(ack.sequence.in_seq, 1);
        assert_eq!(tracker.out_seq(), 0);
    }
}
