//! Channel-based call-control adaptor
//!
//! [`EventCallControl`] turns the [`CallControl`] callbacks into [`CallEvent`]
//! messages, so an application can drive calls from a single receive loop
//! instead of implementing the trait itself. Several processors may share one
//! sender; every event names the local call number it belongs to.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;

use crate::call::ReleaseReason;
use crate::collaborators::CallControl;
use crate::frame::{CodecFormat, InformationElements, MediaKind};

/// Events emitted by a processor
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// Inbound NEW accepted by the processor
    IncomingCall {
        call: u16,
        /// Calling party number
        calling_number: Option<String>,
        /// Calling party name
        calling_name: Option<String>,
        /// Number dialled by the caller
        called_number: Option<String>,
    },

    /// Call accepted with the negotiated codec
    Accepted {
        call: u16,
        codec: Option<CodecFormat>,
    },

    /// The remote phone is ringing
    RemoteRinging { call: u16 },

    /// Both sides answered
    Established { call: u16 },

    /// The call ended
    Released { call: u16, reason: ReleaseReason },

    /// DTMF digit from the peer
    Dtmf { call: u16, digit: char },

    /// Text message from the peer
    Text { call: u16, text: String },

    /// Media from the peer
    Media {
        call: u16,
        kind: MediaKind,
        timestamp: u32,
        payload: Bytes,
    },

    /// Hold state changed on the remote side
    RemoteHold { call: u16, held: bool },

    /// Registration confirmed
    Registered { call: u16, refresh: Option<u16> },
}

impl CallEvent {
    /// Local call number the event belongs to
    pub fn call(&self) -> u16 {
        match self {
            CallEvent::IncomingCall { call, .. }
            | CallEvent::Accepted { call, .. }
            | CallEvent::RemoteRinging { call }
            | CallEvent::Established { call }
            | CallEvent::Released { call, .. }
            | CallEvent::Dtmf { call, .. }
            | CallEvent::Text { call, .. }
            | CallEvent::Media { call, .. }
            | CallEvent::RemoteHold { call, .. }
            | CallEvent::Registered { call, .. } => *call,
        }
    }
}

/// [`CallControl`] implementation that forwards everything as [`CallEvent`]s
#[derive(Debug, Clone)]
pub struct EventCallControl {
    call: u16,
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl EventCallControl {
    pub fn new(call: u16, tx: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self { call, tx }
    }

    /// Adaptor with its own channel
    pub fn channel(call: u16) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(call, tx), rx)
    }

    fn emit(&self, event: CallEvent) {
        if self.tx.send(event).is_err() {
            warn!(call = self.call, "call event receiver dropped");
        }
    }
}

impl CallControl for EventCallControl {
    fn on_incoming_call(&self, ies: &InformationElements) {
        self.emit(CallEvent::IncomingCall {
            call: self.call,
            calling_number: ies.calling_number.clone(),
            calling_name: ies.calling_name.clone(),
            called_number: ies.called_number.clone(),
        });
    }

    fn on_accepted(&self, codec: Option<CodecFormat>) {
        self.emit(CallEvent::Accepted {
            call: self.call,
            codec,
        });
    }

    fn on_remote_ringing(&self) {
        self.emit(CallEvent::RemoteRinging { call: self.call });
    }

    fn on_established(&self) {
        self.emit(CallEvent::Established { call: self.call });
    }

    fn on_released(&self, reason: &ReleaseReason) {
        self.emit(CallEvent::Released {
            call: self.call,
            reason: reason.clone(),
        });
    }

    fn on_user_input_tone(&self, digit: char) {
        self.emit(CallEvent::Dtmf {
            call: self.call,
            digit,
        });
    }

    fn on_text(&self, text: &str) {
        self.emit(CallEvent::Text {
            call: self.call,
            text: text.to_string(),
        });
    }

    fn on_media(&self, kind: MediaKind, timestamp: u32, payload: Bytes) {
        self.emit(CallEvent::Media {
            call: self.call,
            kind,
            timestamp,
            payload,
        });
    }

    fn on_remote_hold(&self, held: bool) {
        self.emit(CallEvent::RemoteHold {
            call: self.call,
            held,
        });
    }

    fn on_registered(&self, refresh: Option<u16>) {
        self.emit(CallEvent::Registered {
            call: self.call,
            refresh,
        });
    }
}
