//! Work requested by the local side: call setup, media, DTMF, text, answer,
//! hold and hangup

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use super::call::{CallWorker, Peer};
use super::{OutgoingCall, Registration};
use crate::call::{CallRole, ReleaseReason};
use crate::frame::{
    FrameKind, InformationElements, MediaKind, MiniFrame, ProtocolCommand, SessionControl,
    cause_code, ies::PROTOCOL_VERSION,
};
use crate::reliability::AckAction;

/// Largest timestamp gap that may still be bridged by a mini frame
const MAX_MINI_GAP_MS: u32 = 0x1_0000;

impl CallWorker {
    pub(super) async fn originate(&mut self, call: OutgoingCall) {
        if self.role != CallRole::Originating {
            warn!(role = ?self.role, "originate on a processor that answers calls");
            return;
        }
        if self.state.is_newed() || self.state.is_terminating() {
            debug!("originate ignored, call already started");
            return;
        }

        self.peer = Some(Peer {
            address: call.address,
            remote_call_number: 0,
        });
        if let Err(e) = self.state.mark_newed() {
            warn!(error = %e, "NEW not sent");
            return;
        }

        let ies = InformationElements {
            version: Some(PROTOCOL_VERSION),
            format: Some(self.config.codecs.preferred.bits()),
            capability: Some(self.config.codecs.supported),
            calling_number: call.calling_number.or_else(|| self.config.local_number.clone()),
            calling_name: call.calling_name.or_else(|| self.config.local_name.clone()),
            username: self.config.local_username.clone(),
            called_number: Some(call.called_number.clone()),
            called_context: call.called_context,
            dnid: call.dnid,
            ..Default::default()
        };

        info!(called = %call.called_number, peer = %call.address, "placing call");
        if let Some(new) = self.command(ProtocolCommand::New) {
            self.transmit(new.with_ies(ies), None).await;
        }
        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    pub(super) async fn register(&mut self, registration: Registration) {
        if self.state.is_terminating() {
            return;
        }
        if self.peer.is_none() {
            self.peer = Some(Peer {
                address: registration.address,
                remote_call_number: 0,
            });
        }
        self.registration_refresh = registration.refresh;

        let ies = InformationElements {
            username: Some(registration.username.clone()),
            refresh: registration.refresh,
            ..Default::default()
        };
        info!(username = %registration.username, peer = %registration.address, "registering");
        if let Some(regreq) = self.command(ProtocolCommand::RegReq) {
            self.transmit(regreq.with_ies(ies), None).await;
        }
        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    /// Send one audio packet as a full or mini frame.
    ///
    /// A full voice frame goes out for the first packet, whenever the low 16
    /// bits of the timestamp wrap, and after a gap too large for a mini frame
    /// to describe. Everything else is a mini frame.
    pub(super) async fn send_audio(&mut self, payload: Bytes, duration_ms: u32) {
        if self.state.is_terminating() || !self.state.is_accepted() {
            trace!("audio before the call is accepted dropped");
            return;
        }
        if self.state.is_remote_quelched() {
            trace!("peer quelched us, audio suppressed");
            return;
        }
        let Some(peer) = self.peer else {
            return;
        };

        let elapsed = self.now_ms();
        let mut timestamp = match duration_ms {
            0 => elapsed,
            step => elapsed - elapsed % step,
        };
        if let Some(last) = self.audio.last {
            let floor = last.wrapping_add(duration_ms.max(1));
            if timestamp < floor {
                timestamp = floor;
            }
        }

        let needs_full = match self.audio.last {
            None => true,
            Some(last) => {
                (timestamp & 0xffff) < (last & 0xffff)
                    || timestamp.wrapping_sub(last) > MAX_MINI_GAP_MS
            }
        };
        self.audio.last = Some(timestamp);

        if needs_full {
            let codec = self
                .state
                .selected_codec()
                .unwrap_or(self.config.codecs.preferred);
            if let Some(frame) = self.frame(FrameKind::Voice(codec)) {
                let frame = frame.with_timestamp(timestamp).with_payload(payload);
                self.transmit(frame, None).await;
            }
        } else {
            let mini = MiniFrame {
                address: peer.address,
                source_call_number: self.local_call_number,
                timestamp: (timestamp & 0xffff) as u16,
                media: MediaKind::Audio,
                payload,
            };
            self.transmit_mini(mini).await;
        }
    }

    pub(super) async fn send_dtmf(&mut self, digits: &str) {
        if self.state.is_terminating() {
            return;
        }
        for digit in digits.chars() {
            if let Some(frame) = self.frame(FrameKind::Dtmf(digit)) {
                self.transmit(frame, None).await;
            }
        }
    }

    pub(super) async fn send_text(&mut self, text: &str) {
        if self.state.is_terminating() {
            return;
        }
        if let Some(frame) = self.frame(FrameKind::Text) {
            let frame = frame.with_payload(Bytes::copy_from_slice(text.as_bytes()));
            self.transmit(frame, None).await;
        }
    }

    /// Local answer on an inbound call
    pub(super) async fn answer(&mut self) {
        if self.role != CallRole::Answering {
            warn!(role = ?self.role, "answer on a processor that did not receive the call");
            return;
        }
        if self.state.is_terminating() || self.state.is_answered() {
            return;
        }
        if !self.state.is_accepted() {
            debug!("answer deferred until the call is accepted");
            self.state.defer_answer();
            return;
        }
        self.send_answer().await;
    }

    pub(super) async fn send_answer(&mut self) {
        self.send_control(SessionControl::Answer, Some(AckAction::AnswerAcked))
            .await;
        self.timers.arm_no_response(self.config.no_response_timeout);
    }

    /// QUELCH (hold) or UNQUELCH (release) towards the peer
    pub(super) async fn set_hold(&mut self, hold: bool) {
        if self.state.is_terminating() || self.state.is_local_hold() == hold {
            return;
        }
        let command = if hold {
            ProtocolCommand::Quelch
        } else {
            ProtocolCommand::Unquelch
        };
        if let Some(frame) = self.command(command) {
            let ies = InformationElements {
                music_on_hold: hold,
                ..Default::default()
            };
            self.transmit(frame.with_ies(ies), None).await;
            self.state.set_local_hold(hold);
        }
    }

    pub(super) async fn hangup(&mut self, cause: Option<String>) {
        if self.state.is_terminating() {
            trace!("hangup while terminating absorbed");
            return;
        }
        let notice = self.local_hangup_notice(cause.clone(), cause_code::NORMAL_CLEARING);
        self.begin_termination(ReleaseReason::LocalHangup(cause), notice)
            .await;
    }
}
