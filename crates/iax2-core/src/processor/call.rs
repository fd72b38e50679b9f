//! The worker's call state and its outbound and termination paths

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::call::{
    CallRole, CallState, CallStateSnapshot, CallStatistics, ReleaseReason, TrafficClass,
};
use crate::collaborators::Collaborators;
use crate::config::ProcessorConfig;
use crate::dispatcher::{AckTarget, FrameDispatcher};
use crate::frame::{
    Frame, FrameKind, FullFrame, InformationElements, MiniFrame, ProtocolCommand, RemoteInfo,
    SessionControl, cause_code,
};
use crate::reliability::{AckAction, PendingAck, PendingAckSlot, SequenceTracker};
use crate::timers::{CallTimers, TimerFired};

/// The far end of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Peer {
    pub address: SocketAddr,
    /// Zero until the peer's first frame tells us its call number
    pub remote_call_number: u16,
}

/// What to tell the peer when the call ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Notice {
    None,
    Hangup { cause: Option<String>, code: u8 },
    Reject { cause: String, code: u8 },
    Inval,
}

/// Outbound audio timing
#[derive(Debug, Default)]
pub(super) struct AudioClock {
    /// Timestamp of the last audio packet sent
    pub last: Option<u32>,
}

pub(super) struct CallWorker {
    pub config: ProcessorConfig,
    pub role: CallRole,
    pub local_call_number: u16,
    pub peer: Option<Peer>,
    pub state: CallState,
    pub dispatcher: FrameDispatcher,
    pub pending: PendingAckSlot,
    pub timers: CallTimers,
    pub collab: Collaborators,
    pub stats: Arc<CallStatistics>,
    state_tx: watch::Sender<CallStateSnapshot>,
    started: Instant,
    pub audio: AudioClock,
    pub missed_pings: u32,
    /// Refresh interval requested by the last REGREQ
    pub registration_refresh: Option<u16>,
    /// Failure detected on the outbound path, acted on after the current item
    pub deferred_failure: Option<ReleaseReason>,
    released: bool,
}

impl CallWorker {
    pub fn new(
        config: ProcessorConfig,
        role: CallRole,
        local_call_number: u16,
        collab: Collaborators,
        stats: Arc<CallStatistics>,
        state_tx: watch::Sender<CallStateSnapshot>,
    ) -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (timers, timer_rx) = CallTimers::new();
        let dispatcher = FrameDispatcher::new(
            SequenceTracker::new(config.min_timestamp_step_ms),
            config.reorder_window,
        );
        let worker = Self {
            config,
            role,
            local_call_number,
            peer: None,
            state: CallState::new(),
            dispatcher,
            pending: PendingAckSlot::new(),
            timers,
            collab,
            stats,
            state_tx,
            started: Instant::now(),
            audio: AudioClock::default(),
            missed_pings: 0,
            registration_refresh: None,
            deferred_failure: None,
            released: false,
        };
        (worker, timer_rx)
    }

    /// Milliseconds since the processor started, wrapping at 32 bits
    pub fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    pub fn publish_state(&self) {
        self.state_tx.send_replace(self.state.snapshot());
    }

    /// Record the peer from an inbound frame, filling in its call number
    /// once it is known.
    pub fn learn_peer(&mut self, address: SocketAddr, source_call_number: u16) {
        match self.peer.as_mut() {
            None => {
                self.peer = Some(Peer {
                    address,
                    remote_call_number: source_call_number,
                });
            }
            Some(peer) if peer.remote_call_number == 0 && source_call_number != 0 => {
                debug!(remote_call = source_call_number, "learned remote call number");
                peer.remote_call_number = source_call_number;
            }
            Some(_) => {}
        }
    }

    fn remote_info(&self) -> Option<RemoteInfo> {
        self.peer.map(|peer| {
            RemoteInfo::new(peer.address, self.local_call_number, peer.remote_call_number)
        })
    }

    /// Build an outbound frame addressed to the peer
    pub fn frame(&self, kind: FrameKind) -> Option<FullFrame> {
        self.remote_info().map(|remote| FullFrame::new(remote, kind))
    }

    pub fn command(&self, command: ProtocolCommand) -> Option<FullFrame> {
        self.frame(FrameKind::Protocol(command))
    }

    /// Stamp and send a full frame, arming the pending ACK when `action` is set
    pub async fn transmit(&mut self, mut frame: FullFrame, action: Option<AckAction>) {
        let now = self.now_ms();
        let seq = self.dispatcher.sequence_mut().stamp_outbound(&mut frame, now);

        if let Some(action) = action {
            self.pending.arm(PendingAck {
                timestamp: frame.timestamp,
                expected_seq_no: seq,
                action,
            });
        }

        if self.state.is_encryption_enabled() {
            if let Some(cipher) = self.collab.cipher.as_ref() {
                if let Err(e) = cipher.encrypt(&mut frame) {
                    warn!(error = %e, "failed to encrypt outbound frame");
                    self.deferred_failure.get_or_insert(ReleaseReason::EncryptionFailed);
                    return;
                }
            }
        }

        trace!(kind = ?frame.kind, out_seq = seq, ts = frame.timestamp, "sending full frame");
        self.stats.record_sent(traffic_class(&frame.kind), frame.byte_len());
        if let Err(e) = self.collab.transmitter.transmit(Frame::Full(frame)).await {
            warn!(error = %e, "transmitter refused frame");
        }
    }

    pub async fn transmit_mini(&mut self, frame: MiniFrame) {
        let class = match frame.media {
            crate::frame::MediaKind::Audio => TrafficClass::Audio,
            crate::frame::MediaKind::Video => TrafficClass::Video,
        };
        self.stats.record_sent(class, frame.payload.len());
        if let Err(e) = self.collab.transmitter.transmit(Frame::Mini(frame)).await {
            warn!(error = %e, "transmitter refused mini frame");
        }
    }

    /// Acknowledge an inbound full frame
    pub async fn send_ack(&mut self, target: AckTarget) {
        if let Some(ack) = self.command(ProtocolCommand::Ack) {
            let ack = ack
                .with_timestamp(target.timestamp)
                .with_sequence(target.out_seq, 0);
            self.transmit(ack, None).await;
        }
    }

    /// Send a protocol command that echoes an inbound frame's timestamp
    pub async fn send_echo(&mut self, command: ProtocolCommand, timestamp: u32) {
        if let Some(frame) = self.command(command) {
            self.transmit(frame.with_timestamp(timestamp), None).await;
        }
    }

    /// The single way a call ends.
    ///
    /// Only the first call does anything: it sets `Terminating`, stops the
    /// timers, drops the pending ACK and held frames, sends `notice` and
    /// reports `reason` to call-control.
    pub async fn begin_termination(&mut self, reason: ReleaseReason, notice: Notice) {
        if !self.state.mark_terminating() {
            trace!(%reason, "already terminating");
            return;
        }
        info!(%reason, "call terminating");

        self.timers.stop_all();
        self.pending.clear();
        self.dispatcher.clear_held();

        match notice {
            Notice::None => {}
            Notice::Hangup { cause, code } => {
                if let Some(frame) = self.command(ProtocolCommand::Hangup) {
                    let ies = InformationElements::with_cause(
                        cause.unwrap_or_else(|| "Normal clearing".to_string()),
                        Some(code),
                    );
                    self.transmit(frame.with_ies(ies), None).await;
                }
            }
            Notice::Reject { cause, code } => {
                if let Some(frame) = self.command(ProtocolCommand::Reject) {
                    let ies = InformationElements::with_cause(cause, Some(code));
                    self.transmit(frame.with_ies(ies), None).await;
                }
            }
            Notice::Inval => {
                if let Some(frame) = self.command(ProtocolCommand::Inval) {
                    self.transmit(frame, None).await;
                }
            }
        }

        self.release(&reason);
        self.publish_state();
    }

    fn release(&mut self, reason: &ReleaseReason) {
        if self.released {
            return;
        }
        self.released = true;
        self.collab.call_control.on_released(reason);
    }

    /// HANGUP towards the peer for a locally initiated end, if a call exists
    pub fn local_hangup_notice(&self, cause: Option<String>, code: u8) -> Notice {
        if self.role == CallRole::Registration || !self.state.is_newed() {
            Notice::None
        } else {
            Notice::Hangup { cause, code }
        }
    }

    /// Act on a failure recorded by the outbound path
    pub async fn apply_deferred_failure(&mut self) {
        if let Some(reason) = self.deferred_failure.take() {
            let notice = self.local_hangup_notice(
                Some(reason.to_string()),
                cause_code::FACILITY_REJECTED,
            );
            self.begin_termination(reason, notice).await;
        }
    }

    /// Send a session control frame
    pub async fn send_control(&mut self, control: SessionControl, action: Option<AckAction>) {
        if let Some(frame) = self.frame(FrameKind::Control(control)) {
            self.transmit(frame, action).await;
        }
    }
}

pub(super) fn traffic_class(kind: &FrameKind) -> TrafficClass {
    match kind {
        FrameKind::Voice(_) => TrafficClass::Audio,
        FrameKind::Video(_) | FrameKind::Image(_) => TrafficClass::Video,
        _ => TrafficClass::Control,
    }
}
