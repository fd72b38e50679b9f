//! Why a call ended

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason handed to call-control when a call is released
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseReason {
    /// Local hangup, with the cause we sent
    LocalHangup(Option<String>),
    /// The peer sent HANGUP
    RemoteHangup(Option<String>),
    /// The peer sent REJECT
    Rejected(Option<String>),
    /// The peer sent INVAL
    Invalidated,
    /// No-response timer expired
    NoAnswer,
    /// Status checks went unanswered
    Unreachable,
    AuthenticationFailed,
    /// No common codec
    CapabilityExchange,
    Busy,
    Congestion,
    RegistrationRejected,
    EncryptionFailed,
    /// Every handle to the processor was dropped
    ProcessorDropped,
}

impl ReleaseReason {
    /// Cause text carried by the HANGUP/REJECT, if any
    pub fn cause(&self) -> Option<&str> {
        match self {
            ReleaseReason::LocalHangup(cause)
            | ReleaseReason::RemoteHangup(cause)
            | ReleaseReason::Rejected(cause) => cause.as_deref(),
            _ => None,
        }
    }

    /// True when the far end ended the call
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ReleaseReason::RemoteHangup(_)
                | ReleaseReason::Rejected(_)
                | ReleaseReason::Invalidated
                | ReleaseReason::Busy
                | ReleaseReason::Congestion
                | ReleaseReason::RegistrationRejected
        )
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReleaseReason::LocalHangup(_) => "local hangup",
            ReleaseReason::RemoteHangup(_) => "remote hangup",
            ReleaseReason::Rejected(_) => "rejected",
            ReleaseReason::Invalidated => "invalidated",
            ReleaseReason::NoAnswer => "no answer",
            ReleaseReason::Unreachable => "unreachable",
            ReleaseReason::AuthenticationFailed => "authentication failed",
            ReleaseReason::CapabilityExchange => "capability exchange failed",
            ReleaseReason::Busy => "busy",
            ReleaseReason::Congestion => "congestion",
            ReleaseReason::RegistrationRejected => "registration rejected",
            ReleaseReason::EncryptionFailed => "encryption failed",
            ReleaseReason::ProcessorDropped => "processor dropped",
        };
        f.write_str(text)
    }
}
