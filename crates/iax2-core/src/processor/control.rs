//! Session control frames from the peer

use tracing::{debug, trace, warn};

use super::call::{CallWorker, Notice};
use crate::call::{CallRole, ReleaseReason};
use crate::frame::{FullFrame, SessionControl};

impl CallWorker {
    pub(super) async fn handle_control(&mut self, control: SessionControl, frame: &FullFrame) {
        trace!(?control, "session control");
        match control {
            SessionControl::Ringing => {
                if self.state.mark_ringing().is_err() {
                    return;
                }
                self.collab.call_control.on_remote_ringing();
                if !self.state.is_answered() {
                    self.timers.arm_no_response(self.config.ringing_timeout);
                }
            }
            SessionControl::Answer => {
                if self.role != CallRole::Originating {
                    debug!("ANSWER on an inbound call ignored");
                    return;
                }
                if self.state.is_answered() {
                    return;
                }
                if !self.state.is_accepted() {
                    warn!("ANSWER before ACCEPT ignored");
                    return;
                }
                self.timers.stop_no_response();
                self.establish().await;
            }
            SessionControl::Hangup => {
                self.begin_termination(
                    ReleaseReason::RemoteHangup(frame.ies.cause.clone()),
                    Notice::None,
                )
                .await;
            }
            SessionControl::Busy => {
                self.begin_termination(ReleaseReason::Busy, Notice::None)
                    .await;
            }
            SessionControl::Congestion => {
                self.begin_termination(ReleaseReason::Congestion, Notice::None)
                    .await;
            }
            SessionControl::Hold => self.collab.call_control.on_remote_hold(true),
            SessionControl::HoldRelease => self.collab.call_control.on_remote_hold(false),
            SessionControl::Progress | SessionControl::Proceeding => {
                if !self.state.is_answered() && self.timers.is_no_response_armed() {
                    self.timers.arm_no_response(self.config.ringing_timeout);
                }
            }
            SessionControl::Ring
            | SessionControl::TakeOffHook
            | SessionControl::OffHook
            | SessionControl::FlashHook
            | SessionControl::Wink
            | SessionControl::Option
            | SessionControl::KeyRadio
            | SessionControl::UnkeyRadio
            | SessionControl::StopSounds => {
                debug!(?control, "session control not acted on");
            }
        }
    }
}
