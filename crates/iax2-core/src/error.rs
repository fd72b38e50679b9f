//! Error types for iax2-core
//!
//! Protocol trouble on the wire (reordering, duplicates, stale acknowledgements,
//! frames for unknown calls) is never reported through these types: the
//! processor logs it and carries on, or ends the call with a
//! [`ReleaseReason`](crate::call::ReleaseReason). The errors here cover the
//! local API surface: configuration, collaborator failures and talking to a
//! processor that has already gone away.

use thiserror::Error;

use crate::call::CallMarker;

/// Result type for iax2-core operations
pub type Result<T> = std::result::Result<T, Iax2Error>;

/// Errors that can occur in the IAX2 core
#[derive(Debug, Error)]
pub enum Iax2Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Operation not allowed in the current call state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The transport collaborator refused a frame
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The encryption collaborator failed to wrap or unwrap a frame
    #[error("Encryption error: {message}")]
    Encryption { message: String },

    /// The authentication collaborator could not build a reply
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// The processor worker has finished and no longer accepts work
    #[error("Processor for call {local_call_number} is closed")]
    ProcessorClosed { local_call_number: u16 },

    /// Registry bookkeeping failure
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// A call state transition was rejected
    #[error(transparent)]
    State(#[from] StateError),
}

impl Iax2Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an encryption error
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }
}

/// Rejected [`CallState`](crate::call::CallState) transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// The marker needs another marker to be set first
    #[error("{marker} requires {requires} to be set first")]
    MissingPrecondition {
        marker: CallMarker,
        requires: CallMarker,
    },

    /// The marker can no longer be set because of a later marker
    #[error("{marker} cannot be set once {blocked_by} is set")]
    Blocked {
        marker: CallMarker,
        blocked_by: CallMarker,
    },

    /// The call is shutting down and only accepts the cleanup path
    #[error("call is terminating, {marker} rejected")]
    Terminating { marker: CallMarker },
}
