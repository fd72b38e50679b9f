//! Per-call IAX2 processor
//!
//! A processor is a tokio task that owns everything about one call: its
//! [`CallState`](crate::call::CallState), sequence numbers, the pending
//! handshake ACK and the call timers. Nothing outside the task touches that
//! state. Producers (the network receiver, the audio path, the UI) talk to it
//! through a [`ProcessorHandle`], which queues [`ProcessorCommand`]s on a
//! bounded channel.
//!
//! Each time the worker wakes it drains every queued command and every fired
//! timer, then handles them in a fixed order: inbound frames, outbound audio,
//! call origination and registration, DTMF, text, answer, hold, timers and
//! finally hangup requests. Several wakes queued before the worker runs
//! collapse into one such cycle.
//!
//! Every way a call can end goes through a single termination path that sets
//! `Terminating`, stops the timers, sends at most one HANGUP (or REJECT/INVAL)
//! and reports the [`ReleaseReason`](crate::call::ReleaseReason) exactly once.
//! The worker exits at the end of the cycle in which that happened.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_iax2_core::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let (transmitter, mut outbound) = ChannelTransmitter::new();
//! let (control, mut events) = EventCallControl::channel(1);
//! let collaborators = Collaborators::new(Arc::new(transmitter), Arc::new(control));
//!
//! let (handle, _task) = CallProcessor::spawn(
//!     ProcessorConfig::default(),
//!     CallRole::Originating,
//!     1,
//!     collaborators,
//! )?;
//! handle
//!     .originate(OutgoingCall::new("192.0.2.10:4569".parse().unwrap(), "200"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod call;
mod control;
mod handlers;
mod outbound;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use crate::call::{CallRole, CallStateSnapshot, CallStatistics, StatisticsSnapshot};
use crate::collaborators::Collaborators;
use crate::config::ProcessorConfig;
use crate::error::{Iax2Error, Result};
use crate::frame::Frame;

use self::call::CallWorker;

/// Parameters of an outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingCall {
    /// Address of the peer
    pub address: SocketAddr,
    pub called_number: String,
    pub called_context: Option<String>,
    pub dnid: Option<String>,
    /// Overrides the configured local number
    pub calling_number: Option<String>,
    /// Overrides the configured local name
    pub calling_name: Option<String>,
}

impl OutgoingCall {
    pub fn new(address: SocketAddr, called_number: impl Into<String>) -> Self {
        Self {
            address,
            called_number: called_number.into(),
            called_context: None,
            dnid: None,
            calling_number: None,
            calling_name: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.called_context = Some(context.into());
        self
    }

    pub fn with_dnid(mut self, dnid: impl Into<String>) -> Self {
        self.dnid = Some(dnid.into());
        self
    }

    pub fn with_calling_number(mut self, number: impl Into<String>) -> Self {
        self.calling_number = Some(number.into());
        self
    }

    pub fn with_calling_name(mut self, name: impl Into<String>) -> Self {
        self.calling_name = Some(name.into());
        self
    }
}

/// Parameters of a registration with a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub address: SocketAddr,
    pub username: String,
    /// Requested refresh interval, seconds
    pub refresh: Option<u16>,
}

impl Registration {
    pub fn new(address: SocketAddr, username: impl Into<String>) -> Self {
        Self {
            address,
            username: username.into(),
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, seconds: u16) -> Self {
        self.refresh = Some(seconds);
        self
    }
}

/// Work queued for a processor
#[derive(Debug)]
pub(crate) enum ProcessorCommand {
    Inbound(Frame),
    Audio { payload: Bytes, duration_ms: u32 },
    Dtmf(String),
    Text(String),
    Answer,
    Hold,
    ReleaseHold,
    Originate(OutgoingCall),
    Register(Registration),
    Hangup(Option<String>),
    Terminate,
}

/// Cloneable handle to a running processor
#[derive(Debug, Clone)]
pub struct ProcessorHandle {
    local_call_number: u16,
    tx: mpsc::Sender<ProcessorCommand>,
    state: watch::Receiver<CallStateSnapshot>,
    stats: Arc<CallStatistics>,
}

impl ProcessorHandle {
    async fn send(&self, command: ProcessorCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Iax2Error::ProcessorClosed {
            local_call_number: self.local_call_number,
        })
    }

    /// Queue an inbound frame from the network
    pub async fn deliver_frame(&self, frame: Frame) -> Result<()> {
        self.send(ProcessorCommand::Inbound(frame)).await
    }

    /// Queue an inbound frame without waiting. A full queue drops the frame,
    /// the same as a lost datagram, and returns `Ok(false)`.
    pub fn try_deliver_frame(&self, frame: Frame) -> Result<bool> {
        match self.tx.try_send(ProcessorCommand::Inbound(frame)) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(call = self.local_call_number, "processor queue full, dropping frame");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Iax2Error::ProcessorClosed {
                local_call_number: self.local_call_number,
            }),
        }
    }

    /// Queue one packet of encoded audio covering `duration_ms`
    pub async fn send_audio(&self, payload: Bytes, duration_ms: u32) -> Result<()> {
        self.send(ProcessorCommand::Audio {
            payload,
            duration_ms,
        })
        .await
    }

    /// Queue DTMF digits; each becomes its own frame
    pub async fn send_dtmf(&self, digits: impl Into<String>) -> Result<()> {
        self.send(ProcessorCommand::Dtmf(digits.into())).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(ProcessorCommand::Text(text.into())).await
    }

    /// Answer an inbound call. Before the call is accepted the answer is held
    /// back and sent once it is.
    pub async fn answer(&self) -> Result<()> {
        self.send(ProcessorCommand::Answer).await
    }

    pub async fn hold(&self) -> Result<()> {
        self.send(ProcessorCommand::Hold).await
    }

    pub async fn release_hold(&self) -> Result<()> {
        self.send(ProcessorCommand::ReleaseHold).await
    }

    /// Send NEW for an originating processor
    pub async fn originate(&self, call: OutgoingCall) -> Result<()> {
        self.send(ProcessorCommand::Originate(call)).await
    }

    /// Send REGREQ
    pub async fn register(&self, registration: Registration) -> Result<()> {
        self.send(ProcessorCommand::Register(registration)).await
    }

    /// Hang up with an optional cause. Hanging up a processor that has
    /// already finished is a no-op.
    pub async fn hangup(&self, cause: Option<String>) -> Result<()> {
        if self.send(ProcessorCommand::Hangup(cause)).await.is_err() {
            debug!(call = self.local_call_number, "hangup on closed processor ignored");
        }
        Ok(())
    }

    /// Ask the processor to end the call and exit
    pub async fn terminate(&self) -> Result<()> {
        if self.send(ProcessorCommand::Terminate).await.is_err() {
            debug!(call = self.local_call_number, "terminate on closed processor ignored");
        }
        Ok(())
    }

    /// Latest state published by the worker
    pub fn state(&self) -> CallStateSnapshot {
        *self.state.borrow()
    }

    /// Receiver that is notified each time the worker publishes state
    pub fn watch_state(&self) -> watch::Receiver<CallStateSnapshot> {
        self.state.clone()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn local_call_number(&self) -> u16 {
        self.local_call_number
    }

    /// True once the worker has exited
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Entry point for starting processors
pub struct CallProcessor;

impl CallProcessor {
    /// Validate `config` and start a worker for one call.
    ///
    /// `local_call_number` is the source call number this side puts in every
    /// frame; allocate it through the
    /// [`ProcessorRegistry`](crate::registry::ProcessorRegistry) when routing
    /// is shared.
    pub fn spawn(
        config: ProcessorConfig,
        role: CallRole,
        local_call_number: u16,
        collaborators: Collaborators,
    ) -> Result<(ProcessorHandle, JoinHandle<()>)> {
        config.validate()?;
        if local_call_number == 0 || local_call_number > 0x7fff {
            return Err(Iax2Error::config(format!(
                "local call number {} outside 1..=32767",
                local_call_number
            )));
        }

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let stats = Arc::new(CallStatistics::new());
        let (state_tx, state_rx) = watch::channel(CallStateSnapshot::default());

        let (worker, timer_rx) =
            CallWorker::new(config, role, local_call_number, collaborators, stats.clone(), state_tx);
        let span = info_span!("iax2_call", call = local_call_number, role = ?role);
        let task = tokio::spawn(worker.run(rx, timer_rx).instrument(span));

        let handle = ProcessorHandle {
            local_call_number,
            tx,
            state: state_rx,
            stats,
        };
        Ok((handle, task))
    }
}
