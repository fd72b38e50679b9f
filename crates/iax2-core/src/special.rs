//! Processor for frames that belong to no call
//!
//! Liveness probes (PING, POKE, LAGRQ) can arrive without a call, and so can
//! stray frames for calls that have already ended. One shared
//! [`NoCallProcessor`] answers them statelessly: every reply takes its
//! sequence numbers from the frame it answers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, trace, warn};

use crate::collaborators::FrameTransmitter;
use crate::error::{Iax2Error, Result};
use crate::frame::{Frame, FullFrame, InformationElements, ProtocolCommand, RemoteInfo};

/// Handle to the shared no-call processor
#[derive(Debug, Clone)]
pub struct NoCallHandle {
    tx: mpsc::Sender<Frame>,
}

impl NoCallHandle {
    pub async fn deliver_frame(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Iax2Error::ProcessorClosed {
                local_call_number: 0,
            })
    }

    /// Queue a frame without waiting; a full queue drops it and returns `Ok(false)`
    pub fn try_deliver_frame(&self, frame: Frame) -> Result<bool> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("no-call queue full, dropping frame");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Iax2Error::ProcessorClosed {
                local_call_number: 0,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct NoCallProcessor {
    transmitter: Arc<dyn FrameTransmitter>,
}

impl NoCallProcessor {
    /// Start the processor. It runs until every handle is dropped.
    pub fn spawn(
        transmitter: Arc<dyn FrameTransmitter>,
        capacity: usize,
    ) -> (NoCallHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let processor = NoCallProcessor { transmitter };
        let task = tokio::spawn(processor.run(rx).instrument(info_span!("iax2_no_call")));
        (NoCallHandle { tx }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<Frame>) {
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Full(full) => self.handle(full).await,
                Frame::Mini(mini) => {
                    trace!(source = mini.source_call_number, "mini frame for no call dropped");
                }
            }
        }
        debug!("no-call processor finished");
    }

    async fn handle(&self, frame: FullFrame) {
        let Some(command) = frame.command_subtype() else {
            // Media or control for a call we do not have
            self.reply(&frame, ProtocolCommand::Ack, None).await;
            return;
        };

        match command {
            ProtocolCommand::Ack | ProtocolCommand::Vnak => {}
            ProtocolCommand::Ping | ProtocolCommand::Poke => {
                self.reply(&frame, ProtocolCommand::Pong, None).await;
            }
            ProtocolCommand::LagRq => {
                self.reply(&frame, ProtocolCommand::LagRp, None).await;
            }
            ProtocolCommand::Pong
            | ProtocolCommand::LagRp
            | ProtocolCommand::Hangup
            | ProtocolCommand::Reject
            | ProtocolCommand::Inval
            | ProtocolCommand::Unsupport
            | ProtocolCommand::RegAck
            | ProtocolCommand::RegRej
            | ProtocolCommand::TxRej => {
                self.reply(&frame, ProtocolCommand::Ack, None).await;
            }
            other => {
                debug!(command = %other, "unsupported command outside a call");
                let ies = InformationElements {
                    unknown_command: Some(other.as_u8()),
                    ..Default::default()
                };
                self.reply(&frame, ProtocolCommand::Unsupport, Some(ies)).await;
            }
        }
    }

    async fn reply(
        &self,
        to: &FullFrame,
        command: ProtocolCommand,
        ies: Option<InformationElements>,
    ) {
        let remote = RemoteInfo::new(
            to.remote.address,
            to.remote.dest_call_number,
            to.remote.source_call_number,
        );
        let out_seq = if command == ProtocolCommand::Ack {
            to.sequence.out_seq
        } else {
            to.sequence.in_seq
        };
        let reply = FullFrame::protocol(remote, command)
            .with_timestamp(to.timestamp)
            .with_sequence(out_seq, to.sequence.out_seq.wrapping_add(1))
            .with_ies(ies.unwrap_or_default());
        trace!(%command, peer = %to.remote.address, "no-call reply");
        if let Err(e) = self.transmitter.transmit(reply.into()).await {
            warn!(error = %e, "failed to send no-call reply");
        }
    }
}
