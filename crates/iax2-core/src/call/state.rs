//! Per-call state markers
//!
//! A call accumulates markers instead of moving through mutually exclusive
//! phases: it can be `Accepted` and `Ringing` at the same time. The markers are
//! private to [`CallState`]; the only way to set one is through a `mark_*`
//! method, which checks the transition table:
//!
//! | Marker        | Requires    | Blocked by  |
//! |---------------|-------------|-------------|
//! | `Newed`       |             |             |
//! | `SentRinging` | `Newed`     | `Answered`  |
//! | `Accepted`    | `Newed`     |             |
//! | `Ringing`     |             |             |
//! | `Authorised`  |             |             |
//! | `Answered`    | `Accepted`  |             |
//! | `Registered`  |             |             |
//! | `Terminating` |             |             |
//!
//! Once `Terminating` is set every other mutator is refused and nothing ever
//! clears it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::frame::CodecFormat;

/// One call phase marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallMarker {
    Newed,
    SentRinging,
    Registered,
    Authorised,
    Accepted,
    Ringing,
    Answered,
    Terminating,
}

impl CallMarker {
    fn bit(self) -> u8 {
        match self {
            CallMarker::Newed => 1 << 0,
            CallMarker::SentRinging => 1 << 1,
            CallMarker::Registered => 1 << 2,
            CallMarker::Authorised => 1 << 3,
            CallMarker::Accepted => 1 << 4,
            CallMarker::Ringing => 1 << 5,
            CallMarker::Answered => 1 << 6,
            CallMarker::Terminating => 1 << 7,
        }
    }
}

impl fmt::Display for CallMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallMarker::Newed => "Newed",
            CallMarker::SentRinging => "SentRinging",
            CallMarker::Registered => "Registered",
            CallMarker::Authorised => "Authorised",
            CallMarker::Accepted => "Accepted",
            CallMarker::Ringing => "Ringing",
            CallMarker::Answered => "Answered",
            CallMarker::Terminating => "Terminating",
        };
        f.write_str(name)
    }
}

type Transition = std::result::Result<(), StateError>;

/// State of one call, owned by its processor worker
#[derive(Debug, Clone, Default)]
pub struct CallState {
    markers: u8,
    selected_codec: Option<CodecFormat>,
    /// Peer sent QUELCH; outbound audio is suppressed
    remote_quelched: bool,
    /// We sent QUELCH to the peer
    local_hold: bool,
    /// Local answer requested before the call was accepted
    answer_pending: bool,
    encryption_enabled: bool,
}

impl CallState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self, marker: CallMarker) -> bool {
        self.markers & marker.bit() != 0
    }

    fn set(&mut self, marker: CallMarker) {
        self.markers |= marker.bit();
    }

    fn guard(&self, marker: CallMarker) -> Transition {
        if self.is_terminating() {
            return Err(StateError::Terminating { marker });
        }
        Ok(())
    }

    fn require(&self, marker: CallMarker, requires: CallMarker) -> Transition {
        if !self.is_set(requires) {
            return Err(StateError::MissingPrecondition { marker, requires });
        }
        Ok(())
    }

    pub fn mark_newed(&mut self) -> Transition {
        self.guard(CallMarker::Newed)?;
        self.set(CallMarker::Newed);
        Ok(())
    }

    pub fn mark_sent_ringing(&mut self) -> Transition {
        let marker = CallMarker::SentRinging;
        self.guard(marker)?;
        self.require(marker, CallMarker::Newed)?;
        if self.is_answered() {
            return Err(StateError::Blocked {
                marker,
                blocked_by: CallMarker::Answered,
            });
        }
        self.set(marker);
        Ok(())
    }

    pub fn mark_accepted(&mut self) -> Transition {
        self.guard(CallMarker::Accepted)?;
        self.require(CallMarker::Accepted, CallMarker::Newed)?;
        self.set(CallMarker::Accepted);
        Ok(())
    }

    pub fn mark_ringing(&mut self) -> Transition {
        self.guard(CallMarker::Ringing)?;
        self.set(CallMarker::Ringing);
        Ok(())
    }

    pub fn mark_authorised(&mut self) -> Transition {
        self.guard(CallMarker::Authorised)?;
        self.set(CallMarker::Authorised);
        Ok(())
    }

    pub fn mark_answered(&mut self) -> Transition {
        self.guard(CallMarker::Answered)?;
        self.require(CallMarker::Answered, CallMarker::Accepted)?;
        self.set(CallMarker::Answered);
        self.answer_pending = false;
        Ok(())
    }

    pub fn mark_registered(&mut self) -> Transition {
        self.guard(CallMarker::Registered)?;
        self.set(CallMarker::Registered);
        Ok(())
    }

    /// Set `Terminating`. Returns `true` only for the call that set it.
    pub fn mark_terminating(&mut self) -> bool {
        if self.is_terminating() {
            return false;
        }
        self.set(CallMarker::Terminating);
        self.answer_pending = false;
        true
    }

    pub fn is_newed(&self) -> bool {
        self.is_set(CallMarker::Newed)
    }

    pub fn is_sent_ringing(&self) -> bool {
        self.is_set(CallMarker::SentRinging)
    }

    pub fn is_registered(&self) -> bool {
        self.is_set(CallMarker::Registered)
    }

    pub fn is_authorised(&self) -> bool {
        self.is_set(CallMarker::Authorised)
    }

    pub fn is_accepted(&self) -> bool {
        self.is_set(CallMarker::Accepted)
    }

    pub fn is_ringing(&self) -> bool {
        self.is_set(CallMarker::Ringing)
    }

    pub fn is_answered(&self) -> bool {
        self.is_set(CallMarker::Answered)
    }

    pub fn is_terminating(&self) -> bool {
        self.is_set(CallMarker::Terminating)
    }

    pub fn selected_codec(&self) -> Option<CodecFormat> {
        self.selected_codec
    }

    pub fn set_selected_codec(&mut self, codec: CodecFormat) {
        self.selected_codec = Some(codec);
    }

    pub fn is_remote_quelched(&self) -> bool {
        self.remote_quelched
    }

    pub fn set_remote_quelched(&mut self, quelched: bool) {
        self.remote_quelched = quelched;
    }

    pub fn is_local_hold(&self) -> bool {
        self.local_hold
    }

    pub fn set_local_hold(&mut self, hold: bool) {
        self.local_hold = hold;
    }

    pub fn is_answer_pending(&self) -> bool {
        self.answer_pending
    }

    /// Remember a local answer that arrived before the call was accepted
    pub fn defer_answer(&mut self) {
        if !self.is_terminating() && !self.is_answered() {
            self.answer_pending = true;
        }
    }

    pub fn is_encryption_enabled(&self) -> bool {
        self.encryption_enabled
    }

    pub fn enable_encryption(&mut self) {
        self.encryption_enabled = true;
    }

    /// Copy of the observable state
    pub fn snapshot(&self) -> CallStateSnapshot {
        CallStateSnapshot {
            newed: self.is_newed(),
            sent_ringing: self.is_sent_ringing(),
            registered: self.is_registered(),
            authorised: self.is_authorised(),
            accepted: self.is_accepted(),
            ringing: self.is_ringing(),
            answered: self.is_answered(),
            terminating: self.is_terminating(),
            selected_codec: self.selected_codec,
            remote_quelched: self.remote_quelched,
            local_hold: self.local_hold,
            encryption_enabled: self.encryption_enabled,
        }
    }
}

/// Read-only copy of [`CallState`] published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallStateSnapshot {
    pub newed: bool,
    pub sent_ringing: bool,
    pub registered: bool,
    pub authorised: bool,
    pub accepted: bool,
    pub ringing: bool,
    pub answered: bool,
    pub terminating: bool,
    pub selected_codec: Option<CodecFormat>,
    pub remote_quelched: bool,
    pub local_hold: bool,
    pub encryption_enabled: bool,
}
