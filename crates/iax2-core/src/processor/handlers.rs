//! Inbound frame handling and protocol commands

use tracing::{debug, info, trace, warn};

use super::call::{CallWorker, Notice};
use crate::call::{CallRole, ReleaseReason, TrafficClass};
use crate::dispatcher::{AckTarget, Dispatch, InboundFull};
use crate::frame::{
    Frame, FrameKind, FullFrame, InformationElements, MediaKind, ProtocolCommand,
    SessionControl, cause_code,
};
use crate::reliability::AckAction;
use crate::timers::{TimerFired, TimerKind};

impl CallWorker {
    pub(super) async fn handle_inbound(&mut self, frame: Frame) {
        let frame = match frame {
            Frame::Full(mut full) => {
                if self.state.is_encryption_enabled() {
                    if let Some(cipher) = self.collab.cipher.as_ref() {
                        if let Err(e) = cipher.decrypt(&mut full) {
                            warn!(error = %e, "dropping frame that failed to decrypt");
                            return;
                        }
                    }
                }
                self.learn_peer(full.remote.address, full.remote.source_call_number);
                Frame::Full(full)
            }
            Frame::Mini(mini) => Frame::Mini(mini),
        };

        match self.dispatcher.dispatch(frame) {
            Dispatch::Media(media) => {
                let class = match media.kind {
                    MediaKind::Audio => TrafficClass::Audio,
                    MediaKind::Video => TrafficClass::Video,
                };
                self.stats.record_received(class, media.payload.len());
                if !self.state.is_terminating() {
                    self.collab
                        .call_control
                        .on_media(media.kind, media.timestamp, media.payload);
                }
            }
            Dispatch::Ack(ack) => {
                self.stats.record_received(TrafficClass::Control, 0);
                self.on_ack(&ack).await;
            }
            Dispatch::Vnak(vnak) => {
                self.stats.record_received(TrafficClass::Control, 0);
                // Handshake frames are covered by the no-response timer, not resent
                debug!(peer_expects = vnak.sequence.in_seq, "VNAK received");
            }
            Dispatch::Apply(frames) => {
                for inbound in frames {
                    self.handle_full(inbound).await;
                }
            }
            Dispatch::AckOnly(target) => self.send_ack(target).await,
            Dispatch::Dropped => {}
        }
    }

    async fn handle_full(&mut self, inbound: InboundFull) {
        let InboundFull { frame, needs_ack } = inbound;
        self.stats
            .record_received(super::call::traffic_class(&frame.kind), frame.byte_len());
        if needs_ack {
            self.send_ack(AckTarget::of(&frame)).await;
        }
        if self.state.is_terminating() {
            trace!(kind = ?frame.kind, "terminating, frame acknowledged only");
            return;
        }

        match frame.kind {
            FrameKind::Protocol(command) => self.handle_command(command, frame).await,
            FrameKind::Control(control) => self.handle_control(control, &frame).await,
            FrameKind::Voice(_) => self.deliver_media(MediaKind::Audio, frame),
            FrameKind::Video(_) => self.deliver_media(MediaKind::Video, frame),
            FrameKind::Dtmf(digit) => self.collab.call_control.on_user_input_tone(digit),
            FrameKind::Text => {
                let text = String::from_utf8_lossy(&frame.payload);
                self.collab.call_control.on_text(&text);
            }
            FrameKind::Null | FrameKind::Image(_) | FrameKind::Html | FrameKind::Cng(_) => {
                trace!(kind = ?frame.kind, "ignoring frame");
            }
        }
    }

    async fn handle_command(&mut self, command: ProtocolCommand, frame: FullFrame) {
        trace!(%command, seq = frame.sequence.out_seq, ts = frame.timestamp, "protocol command");
        match command {
            ProtocolCommand::New => self.on_new(frame).await,
            ProtocolCommand::Ping | ProtocolCommand::Poke => {
                self.send_echo(ProtocolCommand::Pong, frame.timestamp).await;
            }
            ProtocolCommand::Pong => {
                self.missed_pings = 0;
                self.stats.record_pong();
                self.record_rtt(frame.timestamp);
            }
            ProtocolCommand::LagRq => {
                self.send_echo(ProtocolCommand::LagRp, frame.timestamp).await;
            }
            ProtocolCommand::LagRp => self.record_rtt(frame.timestamp),
            ProtocolCommand::Hangup => {
                let cause = frame.ies.cause.clone();
                self.begin_termination(ReleaseReason::RemoteHangup(cause), Notice::None)
                    .await;
            }
            ProtocolCommand::Reject => {
                let cause = frame.ies.cause.clone();
                let reason = if self.role == CallRole::Registration {
                    ReleaseReason::RegistrationRejected
                } else {
                    ReleaseReason::Rejected(cause)
                };
                self.begin_termination(reason, Notice::None).await;
            }
            ProtocolCommand::Inval => {
                self.begin_termination(ReleaseReason::Invalidated, Notice::None)
                    .await;
            }
            ProtocolCommand::Accept => self.on_accept(&frame).await,
            ProtocolCommand::AuthReq => self.on_auth_request(&frame).await,
            ProtocolCommand::RegAuth => self.on_registration_challenge(&frame).await,
            ProtocolCommand::RegAck => {
                self.timers.stop_no_response();
                if let Err(e) = self.state.mark_registered() {
                    warn!(error = %e, "REGACK not applied");
                    return;
                }
                info!(refresh = ?frame.ies.refresh, "registered");
                self.collab.call_control.on_registered(frame.ies.refresh);
            }
            ProtocolCommand::RegRej => {
                self.begin_termination(ReleaseReason::RegistrationRejected, Notice::None)
                    .await;
            }
            ProtocolCommand::Quelch => {
                self.state.set_remote_quelched(true);
                self.collab.call_control.on_remote_hold(true);
            }
            ProtocolCommand::Unquelch => {
                self.state.set_remote_quelched(false);
                self.collab.call_control.on_remote_hold(false);
            }
            ProtocolCommand::TxReq => {
                debug!("refusing transfer request");
                if let Some(reply) = self.command(ProtocolCommand::TxRej) {
                    self.transmit(reply, None).await;
                }
            }
            ProtocolCommand::AuthRep => {
                debug!("AUTHREP on a processor that never challenges, ignoring");
            }
            ProtocolCommand::Unsupport => {
                warn!(command = ?frame.ies.unknown_command, "peer does not support a command we sent");
            }
            ProtocolCommand::DpReq
            | ProtocolCommand::Dial
            | ProtocolCommand::RegReq
            | ProtocolCommand::RegRel
            | ProtocolCommand::Transfer
            | ProtocolCommand::Provision
            | ProtocolCommand::FwDownl
            | ProtocolCommand::Page => self.send_unsupported(command).await,
            ProtocolCommand::DpRep
            | ProtocolCommand::TxCnt
            | ProtocolCommand::TxAcc
            | ProtocolCommand::TxReady
            | ProtocolCommand::TxRel
            | ProtocolCommand::TxRej
            | ProtocolCommand::Mwi
            | ProtocolCommand::FwData => {
                debug!(%command, "command not handled on a call");
            }
            // Classified by the dispatcher before reaching here
            ProtocolCommand::Ack | ProtocolCommand::Vnak => {}
        }
    }

    async fn send_unsupported(&mut self, command: ProtocolCommand) {
        debug!(%command, "answering with UNSUPPORT");
        if let Some(reply) = self.command(ProtocolCommand::Unsupport) {
            let ies = InformationElements {
                unknown_command: Some(command.as_u8()),
                ..Default::default()
            };
            self.transmit(reply.with_ies(ies), None).await;
        }
    }

    fn record_rtt(&self, echoed_timestamp: u32) {
        let rtt = self.now_ms().wrapping_sub(echoed_timestamp);
        trace!(rtt_ms = rtt, "round trip measured");
        self.stats.record_rtt(rtt);
    }

    fn deliver_media(&self, kind: MediaKind, frame: FullFrame) {
        self.collab
            .call_control
            .on_media(kind, frame.timestamp, frame.payload);
    }

    /// Inbound NEW: pick a codec, then ACCEPT or REJECT
    async fn on_new(&mut self, frame: FullFrame) {
        if self.role != CallRole::Answering {
            warn!(role = ?self.role, "NEW on a processor that does not answer calls");
            self.send_unsupported(ProtocolCommand::New).await;
            return;
        }
        if self.state.is_newed() {
            debug!("second NEW on an existing call ignored");
            return;
        }
        if let Err(e) = self.state.mark_newed() {
            warn!(error = %e, "NEW not applied");
            return;
        }
        info!(
            calling = ?frame.ies.calling_number,
            called = ?frame.ies.called_number,
            "incoming call"
        );
        self.collab.call_control.on_incoming_call(&frame.ies);

        let offer = frame.ies.codec_offer();
        let codec = self
            .collab
            .call_control
            .select_codec(&offer, &self.config.codecs);
        let Some(codec) = codec else {
            warn!(offer = ?offer, "no common codec with caller");
            self.begin_termination(
                ReleaseReason::CapabilityExchange,
                Notice::Reject {
                    cause: "Unable to negotiate codec".to_string(),
                    code: cause_code::BEARER_CAPABILITY_NOT_AVAIL,
                },
            )
            .await;
            return;
        };

        debug!(%codec, "codec selected");
        self.state.set_selected_codec(codec);
        if let Some(accept) = self.command(ProtocolCommand::Accept) {
            let ies = InformationElements {
                format: Some(codec.bits()),
                ..Default::default()
            };
            self.transmit(accept.with_ies(ies), Some(AckAction::AcceptAcked))
                .await;
            self.timers.arm_no_response(self.config.no_response_timeout);
        }
    }

    /// Inbound ACCEPT on an outbound call
    async fn on_accept(&mut self, frame: &FullFrame) {
        if self.role != CallRole::Originating {
            debug!("ACCEPT on a processor that did not originate, ignoring");
            return;
        }
        if self.state.is_accepted() {
            return;
        }
        self.timers.stop_no_response();

        let mut offer = frame.ies.codec_offer();
        if offer.capability.is_empty() {
            offer.capability = self.config.codecs.supported;
        }
        let codec = self
            .collab
            .call_control
            .select_codec(&offer, &self.config.codecs);
        let Some(codec) = codec else {
            warn!(offer = ?offer, "peer accepted with a codec we cannot use");
            self.begin_termination(
                ReleaseReason::CapabilityExchange,
                Notice::Hangup {
                    cause: Some("Unable to negotiate codec".to_string()),
                    code: cause_code::BEARER_CAPABILITY_NOT_AVAIL,
                },
            )
            .await;
            return;
        };

        if let Err(e) = self.state.mark_accepted() {
            warn!(error = %e, "ACCEPT not applied");
            return;
        }
        self.state.set_selected_codec(codec);
        info!(%codec, "call accepted by peer");
        self.collab.call_control.on_accepted(Some(codec));
        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    /// Inbound ACK: run the pending action if the coordinates match
    async fn on_ack(&mut self, ack: &FullFrame) {
        let Some(action) = self.pending.resolve(ack.timestamp, ack.sequence.out_seq) else {
            trace!(ts = ack.timestamp, seq = ack.sequence.out_seq, "ACK without pending action");
            return;
        };
        if self.state.is_terminating() {
            return;
        }
        debug!(?action, "pending ACK matched");

        match action {
            AckAction::AcceptAcked => {
                self.timers.stop_no_response();
                if let Err(e) = self.state.mark_accepted() {
                    warn!(error = %e, "accept acknowledgement not applied");
                    return;
                }
                self.collab
                    .call_control
                    .on_accepted(self.state.selected_codec());
                if self.state.is_answer_pending() {
                    self.send_answer().await;
                } else {
                    self.send_ringing().await;
                }
            }
            AckAction::RingingAcked => {
                self.timers.stop_no_response();
            }
            AckAction::AuthReplyAcked => {
                // Still waiting for ACCEPT or REJECT; the restarted timer keeps running
                trace!("authentication reply acknowledged");
            }
            AckAction::AnswerAcked => {
                self.timers.stop_no_response();
                self.establish().await;
            }
        }
    }

    async fn send_ringing(&mut self) {
        if self.state.mark_sent_ringing().is_err() {
            return;
        }
        self.send_control(SessionControl::Ringing, Some(AckAction::RingingAcked))
            .await;
        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    /// Mark the call answered and start liveness probing
    pub(super) async fn establish(&mut self) {
        if let Err(e) = self.state.mark_answered() {
            warn!(error = %e, "answer not applied");
            return;
        }
        info!("call established");
        self.collab.call_control.on_established();
        self.missed_pings = 0;
        self.timers
            .start_status_check(self.config.status_check_interval);
    }

    /// AUTHREQ on an outbound call
    async fn on_auth_request(&mut self, frame: &FullFrame) {
        self.timers.stop_no_response();
        if let Err(e) = self.state.mark_authorised() {
            warn!(error = %e, "AUTHREQ not applied");
            return;
        }

        let Some(authenticator) = self.collab.authenticator.clone() else {
            warn!("challenged but no authenticator configured");
            self.begin_termination(ReleaseReason::AuthenticationFailed, Notice::Inval)
                .await;
            return;
        };
        let reply = match authenticator.authenticate(&frame.ies) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "authentication failed");
                self.begin_termination(ReleaseReason::AuthenticationFailed, Notice::Inval)
                    .await;
                return;
            }
        };

        if let Some(authrep) = self.command(ProtocolCommand::AuthRep) {
            self.transmit(authrep.with_ies(reply.ies), Some(AckAction::AuthReplyAcked))
                .await;
        }

        let offered_aes = frame
            .ies
            .encryption
            .is_some_and(|methods| methods.supports_aes128());
        if offered_aes && self.config.encryption {
            self.enable_encryption(reply.encryption_key.as_deref());
        }

        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    fn enable_encryption(&mut self, key: Option<&str>) {
        let (Some(cipher), Some(key)) = (self.collab.cipher.as_mut(), key) else {
            debug!("peer offered encryption but no cipher or key is available");
            return;
        };
        match cipher.set_key(key) {
            Ok(()) => {
                info!("encryption enabled");
                self.state.enable_encryption();
            }
            Err(e) => {
                warn!(error = %e, "could not key the cipher");
                self.deferred_failure
                    .get_or_insert(ReleaseReason::EncryptionFailed);
            }
        }
    }

    /// REGAUTH: answer the challenge with a fresh REGREQ
    async fn on_registration_challenge(&mut self, frame: &FullFrame) {
        self.timers.stop_no_response();
        let reply = match self.collab.authenticator.clone() {
            Some(authenticator) => authenticator.authenticate(&frame.ies),
            None => Err(crate::error::Iax2Error::authentication(
                "no authenticator configured",
            )),
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "registration authentication failed");
                self.begin_termination(ReleaseReason::AuthenticationFailed, Notice::None)
                    .await;
                return;
            }
        };

        if let Some(regreq) = self.command(ProtocolCommand::RegReq) {
            let mut ies = reply.ies;
            if ies.username.is_none() {
                ies.username = frame.ies.username.clone();
            }
            ies.refresh = ies.refresh.or(self.registration_refresh);
            self.transmit(regreq.with_ies(ies), None).await;
            self.timers.arm_no_response(self.config.no_response_timeout);
        }
    }

    pub(super) async fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.is_current(&fired) {
            trace!(?fired, "stale timer ignored");
            return;
        }
        match fired.kind {
            TimerKind::NoResponse => {
                warn!("no response from peer");
                let notice = self.local_hangup_notice(
                    Some("No answer".to_string()),
                    cause_code::NO_USER_RESPONSE,
                );
                self.begin_termination(ReleaseReason::NoAnswer, notice).await;
            }
            TimerKind::StatusCheck => {
                if self.missed_pings >= self.config.max_missed_pings {
                    warn!(missed = self.missed_pings, "peer stopped answering status checks");
                    let notice = self.local_hangup_notice(
                        Some("Peer unreachable".to_string()),
                        cause_code::DESTINATION_OUT_OF_ORDER,
                    );
                    self.begin_termination(ReleaseReason::Unreachable, notice)
                        .await;
                    return;
                }
                self.missed_pings += 1;
                self.stats.record_ping();
                if let Some(ping) = self.command(ProtocolCommand::Ping) {
                    self.transmit(ping, None).await;
                }
                if let Some(lagrq) = self.command(ProtocolCommand::LagRq) {
                    self.transmit(lagrq, None).await;
                }
            }
        }
    }
}
