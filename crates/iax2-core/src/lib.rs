//! # IAX2 call processing for RVOIP
//!
//! `rvoip-iax2-core` holds the per-call IAX2 protocol engine: the state machine
//! that carries one call from NEW through authentication, ACCEPT, RINGING and
//! ANSWER to HANGUP. It tracks sequence numbers and handshake
//! acknowledgements, and runs the call's two timers.
//!
//! The engine is transport-agnostic. Frames come in and go out as structured
//! [`Frame`](frame::Frame) values; encoding them, moving them over UDP,
//! encrypting them and deciding what to do with a call are left to the
//! collaborators in [`collaborators`].
//!
//! ## Architecture
//!
//! ```text
//!   network receiver ──┐                          ┌──> FrameTransmitter
//!   audio capture   ───┼──> ProcessorHandle ──> worker task ──> CallControl
//!   UI (answer, DTMF) ─┘        (mpsc)         │
//!                                              ├─ FrameDispatcher (SequenceTracker, reorder buffer)
//!                                              ├─ CallState
//!                                              ├─ PendingAckSlot
//!                                              └─ CallTimers (no-response, status check)
//! ```
//!
//! One worker task runs per call and is the only owner of that call's state.
//! Frames not tied to a call are answered by the shared
//! [`NoCallProcessor`](special::NoCallProcessor), and the
//! [`ProcessorRegistry`](registry::ProcessorRegistry) decides which processor
//! an inbound frame belongs to.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_iax2_core::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let (transmitter, _outbound) = ChannelTransmitter::new();
//! let (no_call, _) = NoCallProcessor::spawn(Arc::new(transmitter.clone()), 64);
//! let registry = ProcessorRegistry::new(no_call);
//!
//! let local = registry.allocate_call_number()?;
//! let (control, mut events) = EventCallControl::channel(local);
//! let (handle, _task) = CallProcessor::spawn(
//!     ProcessorConfig::default(),
//!     CallRole::Originating,
//!     local,
//!     Collaborators::new(Arc::new(transmitter), Arc::new(control)),
//! )?;
//! registry.insert(handle.clone());
//!
//! handle
//!     .originate(OutgoingCall::new("192.0.2.10:4569".parse().unwrap(), "200"))
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     if let CallEvent::Released { reason, .. } = event {
//!         println!("call ended: {}", reason);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod call;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod frame;
pub mod logging;
pub mod processor;
pub mod registry;
pub mod reliability;
pub mod special;
pub mod timers;

pub use call::{
    CallMarker, CallRole, CallState, CallStateSnapshot, CallStatistics, CallToken, ReleaseReason,
    StatisticsSnapshot,
};
pub use config::ProcessorConfig;
pub use error::{Iax2Error, Result, StateError};
pub use processor::{CallProcessor, OutgoingCall, ProcessorHandle, Registration};
pub use registry::{ProcessorRegistry, RouteOutcome};

/// Common imports for working with the IAX2 core
pub mod prelude {
    pub use crate::auth::Md5Authenticator;
    pub use crate::call::{
        CallRole, CallStateSnapshot, CallToken, ReleaseReason, StatisticsSnapshot,
    };
    pub use crate::collaborators::{
        AuthReply, Authenticator, CallControl, ChannelTransmitter, Collaborators, FrameCipher,
        FrameTransmitter,
    };
    pub use crate::config::ProcessorConfig;
    pub use crate::error::{Iax2Error, Result};
    pub use crate::events::{CallEvent, EventCallControl};
    pub use crate::frame::{
        CodecFormat, CodecPreferences, CodecSet, Frame, FrameKind, FullFrame,
        InformationElements, MiniFrame, ProtocolCommand, RemoteInfo, SessionControl,
    };
    pub use crate::logging::{LoggingConfig, setup_logging};
    pub use crate::processor::{CallProcessor, OutgoingCall, ProcessorHandle, Registration};
    pub use crate::registry::{ProcessorRegistry, RouteOutcome};
    pub use crate::special::{NoCallHandle, NoCallProcessor};
}
