//! Worker loop: wait, drain, handle in priority order, repeat

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::call::CallWorker;
use super::{OutgoingCall, ProcessorCommand, Registration};
use crate::call::ReleaseReason;
use crate::frame::{Frame, cause_code};
use crate::timers::TimerFired;

/// Session setup requests
#[derive(Debug)]
enum Setup {
    Originate(OutgoingCall),
    Register(Registration),
}

/// Everything drained in one wake, bucketed by queue
#[derive(Debug, Default)]
struct Batch {
    inbound: Vec<Frame>,
    audio: Vec<(Bytes, u32)>,
    setup: Vec<Setup>,
    dtmf: Vec<String>,
    text: Vec<String>,
    answer: usize,
    hold: Vec<bool>,
    timers: Vec<TimerFired>,
    hangups: Vec<Option<String>>,
    terminate: bool,
}

impl Batch {
    fn push(&mut self, command: ProcessorCommand) {
        match command {
            ProcessorCommand::Inbound(frame) => self.inbound.push(frame),
            ProcessorCommand::Audio {
                payload,
                duration_ms,
            } => self.audio.push((payload, duration_ms)),
            ProcessorCommand::Originate(call) => self.setup.push(Setup::Originate(call)),
            ProcessorCommand::Register(reg) => self.setup.push(Setup::Register(reg)),
            ProcessorCommand::Dtmf(digits) => self.dtmf.push(digits),
            ProcessorCommand::Text(text) => self.text.push(text),
            ProcessorCommand::Answer => self.answer += 1,
            ProcessorCommand::Hold => self.hold.push(true),
            ProcessorCommand::ReleaseHold => self.hold.push(false),
            ProcessorCommand::Hangup(cause) => self.hangups.push(cause),
            ProcessorCommand::Terminate => self.terminate = true,
        }
    }
}

impl CallWorker {
    pub(super) async fn run(
        mut self,
        mut commands: mpsc::Receiver<ProcessorCommand>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    ) {
        debug!("processor started");
        self.publish_state();

        loop {
            let mut batch = Batch::default();
            let mut handles_gone = false;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => batch.push(command),
                    None => handles_gone = true,
                },
                Some(fired) = timer_rx.recv() => batch.timers.push(fired),
            }

            while let Ok(command) = commands.try_recv() {
                batch.push(command);
            }
            while let Ok(fired) = timer_rx.try_recv() {
                batch.timers.push(fired);
            }

            self.handle_batch(batch).await;

            if handles_gone && !self.state.is_terminating() {
                let notice = self.local_hangup_notice(None, cause_code::NORMAL_CLEARING);
                self.begin_termination(ReleaseReason::ProcessorDropped, notice)
                    .await;
            }

            self.publish_state();
            if self.state.is_terminating() {
                break;
            }
        }

        debug!("processor finished");
    }

    async fn handle_batch(&mut self, batch: Batch) {
        trace!(
            inbound = batch.inbound.len(),
            audio = batch.audio.len(),
            timers = batch.timers.len(),
            hangups = batch.hangups.len(),
            "draining queues"
        );

        for frame in batch.inbound {
            self.handle_inbound(frame).await;
            self.apply_deferred_failure().await;
        }

        for (payload, duration_ms) in batch.audio {
            self.send_audio(payload, duration_ms).await;
        }

        for setup in batch.setup {
            match setup {
                Setup::Originate(call) => self.originate(call).await,
                Setup::Register(reg) => self.register(reg).await,
            }
        }

        for digits in batch.dtmf {
            self.send_dtmf(&digits).await;
        }

        for text in batch.text {
            self.send_text(&text).await;
        }

        for _ in 0..batch.answer {
            self.answer().await;
        }

        for hold in batch.hold {
            self.set_hold(hold).await;
        }

        for fired in batch.timers {
            self.handle_timer(fired).await;
        }

        self.apply_deferred_failure().await;

        for cause in batch.hangups {
            self.hangup(cause).await;
        }

        if batch.terminate {
            self.hangup(None).await;
        }
    }
}
