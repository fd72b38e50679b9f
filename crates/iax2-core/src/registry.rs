//! Routing inbound frames to processors
//!
//! The registry maps local call numbers and call tokens to processor handles.
//! A frame is routed by, in order:
//!
//! 1. its destination call number, when that is one of ours (the token is
//!    learned from this frame if it was not known yet)
//! 2. its call token, for mini frames and for retransmitted NEWs
//! 3. otherwise an unknown NEW is handed back to the caller as
//!    [`RouteOutcome::NewCall`], and everything else goes to the no-call
//!    processor

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, trace};

use crate::call::CallToken;
use crate::error::{Iax2Error, Result};
use crate::frame::{Frame, FullFrame, ProtocolCommand};
use crate::processor::ProcessorHandle;
use crate::special::NoCallHandle;

/// Highest source call number IAX2 allows
pub const MAX_CALL_NUMBER: u16 = 0x7fff;

/// Where [`ProcessorRegistry::route`] sent a frame
#[derive(Debug)]
pub enum RouteOutcome {
    /// Delivered to the processor with this local call number
    Delivered(u16),
    /// A NEW for no known call; call-control decides whether to accept it
    NewCall(FullFrame),
    /// The processor's queue was full and the frame was discarded
    Dropped(u16),
    /// Handed to the no-call processor (or dropped when its queue was full)
    NoCall,
}

pub struct ProcessorRegistry {
    by_local: DashMap<u16, ProcessorHandle>,
    by_token: DashMap<CallToken, u16>,
    reserved: Mutex<HashSet<u16>>,
    cursor: Mutex<u16>,
    no_call: NoCallHandle,
}

impl ProcessorRegistry {
    pub fn new(no_call: NoCallHandle) -> Self {
        let start = rand::thread_rng().gen_range(1..=MAX_CALL_NUMBER);
        Self {
            by_local: DashMap::new(),
            by_token: DashMap::new(),
            reserved: Mutex::new(HashSet::new()),
            cursor: Mutex::new(start),
            no_call,
        }
    }

    /// Reserve an unused local call number in 1..=32767.
    ///
    /// Processors whose workers have exited are swept first, so their numbers
    /// become reusable.
    pub fn allocate_call_number(&self) -> Result<u16> {
        self.remove_closed();
        let mut cursor = self.cursor.lock();
        let mut reserved = self.reserved.lock();
        for _ in 0..MAX_CALL_NUMBER {
            let candidate = *cursor;
            *cursor = if candidate >= MAX_CALL_NUMBER { 1 } else { candidate + 1 };
            if !self.by_local.contains_key(&candidate) && reserved.insert(candidate) {
                trace!(call = candidate, "allocated call number");
                return Ok(candidate);
            }
        }
        Err(Iax2Error::registry("no free call numbers"))
    }

    /// Register a processor under its local call number
    pub fn insert(&self, handle: ProcessorHandle) {
        let local = handle.local_call_number();
        self.reserved.lock().remove(&local);
        self.by_local.insert(local, handle);
    }

    /// Register an answering processor together with the caller's token
    pub fn insert_with_token(&self, token: CallToken, handle: ProcessorHandle) {
        let local = handle.local_call_number();
        self.insert(handle);
        self.by_token.insert(token, local);
    }

    /// Drop a processor and every token pointing at it
    pub fn remove(&self, local_call_number: u16) -> Option<ProcessorHandle> {
        self.reserved.lock().remove(&local_call_number);
        self.by_token.retain(|_, local| *local != local_call_number);
        self.by_local
            .remove(&local_call_number)
            .map(|(_, handle)| handle)
    }

    /// Remove processors whose workers have exited.
    ///
    /// Runs on every allocation. Applications that rarely allocate can call it
    /// periodically; `route` only removes a finished processor when a frame
    /// for it arrives.
    pub fn remove_closed(&self) -> usize {
        let closed: Vec<u16> = self
            .by_local
            .iter()
            .filter(|entry| entry.value().is_closed())
            .map(|entry| *entry.key())
            .collect();
        for local in &closed {
            self.remove(*local);
        }
        closed.len()
    }

    pub fn get(&self, local_call_number: u16) -> Option<ProcessorHandle> {
        self.by_local
            .get(&local_call_number)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    fn lookup(&self, frame: &Frame) -> Option<ProcessorHandle> {
        let token = frame.remote_endpoint_key();
        if let Some(dest) = frame.dest_call_number().filter(|dest| *dest != 0) {
            if let Some(handle) = self.get(dest) {
                if !self.by_token.contains_key(&token) {
                    debug!(call = dest, %token, "learned call token");
                    self.by_token.insert(token, dest);
                }
                return Some(handle);
            }
        }
        let local = self.by_token.get(&token).map(|entry| *entry.value())?;
        self.get(local)
    }

    /// Send an inbound frame to whoever should handle it.
    ///
    /// Never waits on a processor: a full queue drops the frame the way the
    /// network would, so one slow call cannot hold up the receive loop.
    pub fn route(&self, frame: Frame) -> Result<RouteOutcome> {
        if let Some(handle) = self.lookup(&frame) {
            let local = handle.local_call_number();
            match handle.try_deliver_frame(frame.clone()) {
                Ok(true) => return Ok(RouteOutcome::Delivered(local)),
                Ok(false) => return Ok(RouteOutcome::Dropped(local)),
                Err(Iax2Error::ProcessorClosed { .. }) => {
                    debug!(call = local, "processor closed, routing to no-call");
                    self.remove(local);
                }
                Err(e) => return Err(e),
            }
        }

        match frame {
            Frame::Full(full)
                if full.is_command(ProtocolCommand::New) && full.remote.dest_call_number == 0 =>
            {
                Ok(RouteOutcome::NewCall(full))
            }
            other => {
                self.no_call.try_deliver_frame(other)?;
                Ok(RouteOutcome::NoCall)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::collaborators::ChannelTransmitter;
    use crate::special::NoCallProcessor;

    fn registry() -> ProcessorRegistry {
        let (transmitter, _rx) = ChannelTransmitter::new();
        let (no_call, _task) = NoCallProcessor::spawn(Arc::new(transmitter), 8);
        ProcessorRegistry::new(no_call)
    }

    #[tokio::test]
    async fn test_allocated_numbers_are_unique_and_in_range() {
        let registry = registry();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let number = registry.allocate_call_number().unwrap();
            assert!((1..=MAX_CALL_NUMBER).contains(&number));
            assert!(seen.insert(number));
        }
    }
}
