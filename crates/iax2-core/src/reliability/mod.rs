//! Sequence numbers and handshake acknowledgement tracking

pub mod pending_ack;
pub mod sequence;

pub use pending_ack::{AckAction, PendingAck, PendingAckSlot};
pub use sequence::{InboundClass, MAX_EARLY_DISTANCE, SequenceTracker};
