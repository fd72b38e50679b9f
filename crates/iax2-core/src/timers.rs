//! Call timers
//!
//! Two independent timers run per call:
//!
//! - **No-response**: one-shot, armed whenever we send a setup frame that
//!   expects an answer. Expiry aborts the call with "no answer".
//! - **Status check**: periodic, started once the call is established. Each
//!   tick sends PING and LAGRQ.
//!
//! Timers are spawned tasks that report back through a channel the worker
//! selects on. Each arming gets a child [`CancellationToken`] and a generation
//! number. Re-arming cancels the previous task, and the worker drops any
//! [`TimerFired`] whose generation is no longer current, so a tick that was
//! already queued when the timer was stopped is never acted on. After
//! [`CallTimers::stop_all`] nothing can be armed again.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    NoResponse,
    StatusCheck,
}

/// Message a timer task sends when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    token: CancellationToken,
}

impl ArmedTimer {
    fn cancel(self) {
        self.token.cancel();
    }
}

/// The timers of one call, owned by its worker
#[derive(Debug)]
pub struct CallTimers {
    tx: mpsc::UnboundedSender<TimerFired>,
    root: CancellationToken,
    no_response: Option<ArmedTimer>,
    status_check: Option<ArmedTimer>,
    next_generation: u64,
}

impl CallTimers {
    /// Create the timers and the receiver the worker listens on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Self {
            tx,
            root: CancellationToken::new(),
            no_response: None,
            status_check: None,
            next_generation: 1,
        };
        (timers, rx)
    }

    fn next_token(&mut self) -> (u64, CancellationToken) {
        let generation = self.next_generation;
        self.next_generation += 1;
        (generation, self.root.child_token())
    }

    /// Start (or restart) the no-response timer
    pub fn arm_no_response(&mut self, window: Duration) {
        if self.is_stopped() {
            return;
        }
        self.stop_no_response();
        let (generation, token) = self.next_token();
        let tx = self.tx.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(window) => {
                    let _ = tx.send(TimerFired { kind: TimerKind::NoResponse, generation });
                }
            }
        });
        trace!(generation, window_ms = window.as_millis() as u64, "no-response timer armed");
        self.no_response = Some(ArmedTimer { generation, token });
    }

    pub fn stop_no_response(&mut self) {
        if let Some(timer) = self.no_response.take() {
            trace!(generation = timer.generation, "no-response timer stopped");
            timer.cancel();
        }
    }

    pub fn is_no_response_armed(&self) -> bool {
        self.no_response.is_some()
    }

    /// Start the periodic status check. The first tick comes one period from now.
    pub fn start_status_check(&mut self, period: Duration) {
        if self.is_stopped() {
            return;
        }
        self.stop_status_check();
        let (generation, token) = self.next_token();
        let tx = self.tx.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticks.tick() => {
                        if tx.send(TimerFired { kind: TimerKind::StatusCheck, generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        trace!(generation, period_ms = period.as_millis() as u64, "status check started");
        self.status_check = Some(ArmedTimer { generation, token });
    }

    pub fn stop_status_check(&mut self) {
        if let Some(timer) = self.status_check.take() {
            timer.cancel();
        }
    }

    pub fn is_status_check_running(&self) -> bool {
        self.status_check.is_some()
    }

    /// Cancel everything and refuse further arming
    pub fn stop_all(&mut self) {
        self.stop_no_response();
        self.stop_status_check();
        self.root.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Whether a fired message belongs to the timer currently armed for its kind.
    ///
    /// A current no-response firing disarms the one-shot timer.
    pub fn is_current(&mut self, fired: &TimerFired) -> bool {
        if self.is_stopped() {
            return false;
        }
        match fired.kind {
            TimerKind::NoResponse => {
                let current = self
                    .no_response
                    .as_ref()
                    .is_some_and(|t| t.generation == fired.generation);
                if current {
                    self.no_response = None;
                }
                current
            }
            TimerKind::StatusCheck => self
                .status_check
                .as_ref()
                .is_some_and(|t| t.generation == fired.generation),
        }
    }
}

impl Drop for CallTimers {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
