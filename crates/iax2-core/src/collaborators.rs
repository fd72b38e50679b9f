//! Contracts between the processor and the rest of the stack
//!
//! The processor is a pure protocol engine. Everything that touches the
//! outside world sits behind one of these traits:
//!
//! - [`FrameTransmitter`] encodes and sends frames (no delivery guarantee)
//! - [`CallControl`] learns about call progress and picks codecs
//! - [`Authenticator`] answers AUTHREQ/REGAUTH challenges
//! - [`FrameCipher`] wraps and unwraps full-frame payloads once encryption is on

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::call::ReleaseReason;
use crate::error::{Iax2Error, Result};
use crate::frame::{
    CodecFormat, CodecOffer, CodecPreferences, Frame, FullFrame, InformationElements, MediaKind,
};

/// Hands frames to the network
#[async_trait]
pub trait FrameTransmitter: Send + Sync {
    /// Encode and send one frame. Success means the frame was queued, not delivered.
    async fn transmit(&self, frame: Frame) -> Result<()>;
}

/// Transmitter that pushes frames onto an unbounded channel.
///
/// Useful for wiring a processor to a socket task, and for tests that want to
/// inspect what a processor sends.
#[derive(Debug, Clone)]
pub struct ChannelTransmitter {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ChannelTransmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameTransmitter for ChannelTransmitter {
    async fn transmit(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Iax2Error::transport("frame channel closed"))
    }
}

/// The call-control layer above a processor.
///
/// Callbacks run on the processor's worker task and must not block.
pub trait CallControl: Send + Sync {
    /// Pick the codec for a call from the remote offer. Returning `None` fails
    /// the capability exchange.
    fn select_codec(&self, offer: &CodecOffer, local: &CodecPreferences) -> Option<CodecFormat> {
        offer.negotiate(local.supported)
    }

    /// An inbound NEW was accepted by the processor
    fn on_incoming_call(&self, _ies: &InformationElements) {}

    /// ACCEPT was sent and acknowledged, or received for an outbound call
    fn on_accepted(&self, _codec: Option<CodecFormat>) {}

    /// The remote side is ringing
    fn on_remote_ringing(&self) {}

    /// The call is answered on both sides
    fn on_established(&self);

    /// The call is over. Called exactly once per processor.
    fn on_released(&self, reason: &ReleaseReason);

    fn on_user_input_tone(&self, _digit: char) {}

    fn on_text(&self, _text: &str) {}

    /// Inbound media with its reconstructed 32-bit timestamp
    fn on_media(&self, _kind: MediaKind, _timestamp: u32, _payload: Bytes) {}

    /// The peer put us on hold (`true`) or released the hold (`false`)
    fn on_remote_hold(&self, _held: bool) {}

    /// REGACK arrived, with the refresh interval in seconds when supplied
    fn on_registered(&self, _refresh: Option<u16>) {}
}

/// Reply material produced for an AUTHREQ or REGAUTH
#[derive(Debug, Clone, Default)]
pub struct AuthReply {
    /// IEs to place in the AUTHREP (or REGREQ)
    pub ies: InformationElements,
    /// Key material for the cipher when the peer offered encryption
    pub encryption_key: Option<String>,
}

/// Answers authentication challenges
pub trait Authenticator: Send + Sync {
    /// Build a reply to the challenge carried in `challenge`. An error ends
    /// the call with an authentication failure.
    fn authenticate(&self, challenge: &InformationElements) -> Result<AuthReply>;
}

/// Encryption of full-frame payloads
pub trait FrameCipher: Send + Sync {
    fn set_key(&mut self, key: &str) -> Result<()>;

    fn encrypt(&self, frame: &mut FullFrame) -> Result<()>;

    fn decrypt(&self, frame: &mut FullFrame) -> Result<()>;
}

/// Everything a processor needs from outside
pub struct Collaborators {
    pub transmitter: Arc<dyn FrameTransmitter>,
    pub call_control: Arc<dyn CallControl>,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub cipher: Option<Box<dyn FrameCipher>>,
}

impl Collaborators {
    pub fn new(transmitter: Arc<dyn FrameTransmitter>, call_control: Arc<dyn CallControl>) -> Self {
        Self {
            transmitter,
            call_control,
            authenticator: None,
            cipher: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_cipher(mut self, cipher: Box<dyn FrameCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("authenticator", &self.authenticator.is_some())
            .field("cipher", &self.cipher.is_some())
            .finish()
    }
}
