//! The single outstanding handshake acknowledgement

use tracing::debug;

/// Follow-up to run when the peer acknowledges a handshake frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    RingingAcked,
    AcceptAcked,
    AuthReplyAcked,
    AnswerAcked,
}

/// Coordinates of a sent frame still waiting for its ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    /// Timestamp of the frame we sent
    pub timestamp: u32,
    /// `out_seq` of the frame we sent
    pub expected_seq_no: u8,
    pub action: AckAction,
}

/// At most one [`PendingAck`] per call.
///
/// Handshake frames go out strictly one after another, so arming a new record
/// while an older one is unconsumed simply replaces it.
#[derive(Debug, Clone, Default)]
pub struct PendingAckSlot {
    slot: Option<PendingAck>,
}

impl PendingAckSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, returning the one it replaced
    pub fn arm(&mut self, pending: PendingAck) -> Option<PendingAck> {
        let replaced = self.slot.replace(pending);
        if let Some(old) = replaced {
            debug!(?old, new = ?pending, "replacing unconsumed pending ack");
        }
        replaced
    }

    /// Consume the record if the ACK coordinates match it exactly
    pub fn resolve(&mut self, timestamp: u32, seq_no: u8) -> Option<AckAction> {
        match self.slot {
            Some(pending) if pending.timestamp == timestamp && pending.expected_seq_no == seq_no => {
                self.slot = None;
                Some(pending.action)
            }
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn current(&self) -> Option<&PendingAck> {
        self.slot.as_ref()
    }
}
