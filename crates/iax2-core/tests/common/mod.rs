//! Shared helpers for processor integration tests
//!
//! A [`Peer`] plays the remote IAX2 endpoint: it builds frames with its own
//! sequence numbers and timestamps, delivers them to the processor under test
//! and reads back whatever the processor transmits.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rvoip_iax2_core::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const LOCAL_CALL: u16 = 11;
pub const REMOTE_CALL: u16 = 42;

pub struct Peer {
    pub handle: ProcessorHandle,
    pub task: JoinHandle<()>,
    pub outbound: mpsc::UnboundedReceiver<Frame>,
    pub events: mpsc::UnboundedReceiver<CallEvent>,
    pub address: SocketAddr,
    out_seq: u8,
    clock: u32,
}

pub fn peer_address() -> SocketAddr {
    "192.0.2.20:4569".parse().unwrap()
}

pub fn test_config() -> ProcessorConfig {
    ProcessorConfig::default()
        .with_local_number("100")
        .with_local_username("alice")
}

impl Peer {
    pub fn start(config: ProcessorConfig, role: CallRole) -> Self {
        Self::start_with(config, role, |c| c)
    }

    pub fn start_with(
        config: ProcessorConfig,
        role: CallRole,
        customise: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Self {
        let (transmitter, outbound) = ChannelTransmitter::new();
        let (control, events) = EventCallControl::channel(LOCAL_CALL);
        let collaborators =
            customise(Collaborators::new(Arc::new(transmitter), Arc::new(control)));
        let (handle, task) = CallProcessor::spawn(config, role, LOCAL_CALL, collaborators)
            .expect("processor starts");
        Self {
            handle,
            task,
            outbound,
            events,
            address: peer_address(),
            out_seq: 0,
            clock: 1000,
        }
    }

    /// Next frame from the peer; consumes one peer sequence number
    pub fn frame(&mut self, kind: FrameKind) -> FullFrame {
        let seq = self.out_seq;
        self.out_seq = self.out_seq.wrapping_add(1);
        self.frame_with_seq(kind, seq)
    }

    /// Frame with an explicit sequence number; does not touch the peer's counter
    pub fn frame_with_seq(&mut self, kind: FrameKind, seq: u8) -> FullFrame {
        self.clock += 20;
        let dest = if kind == FrameKind::Protocol(ProtocolCommand::New) {
            0
        } else {
            LOCAL_CALL
        };
        FullFrame::new(RemoteInfo::new(self.address, REMOTE_CALL, dest), kind)
            .with_sequence(seq, 0)
            .with_timestamp(self.clock)
    }

    pub fn command(&mut self, command: ProtocolCommand) -> FullFrame {
        self.frame(FrameKind::Protocol(command))
    }

    /// NEW offering uLaw and GSM
    pub fn new_call(&mut self) -> FullFrame {
        let ies = InformationElements {
            version: Some(2),
            format: Some(CodecFormat::ULAW.bits()),
            capability: Some(CodecSet::EMPTY.with(CodecFormat::ULAW).with(CodecFormat::GSM)),
            calling_number: Some("200".into()),
            called_number: Some("100".into()),
            ..Default::default()
        };
        self.command(ProtocolCommand::New).with_ies(ies)
    }

    /// ACK for a frame the processor sent
    pub fn ack(&self, sent: &FullFrame) -> FullFrame {
        FullFrame::protocol(
            RemoteInfo::new(self.address, REMOTE_CALL, LOCAL_CALL),
            ProtocolCommand::Ack,
        )
        .with_timestamp(sent.timestamp)
        .with_sequence(sent.sequence.out_seq, self.out_seq)
    }

    pub async fn deliver(&self, frame: FullFrame) {
        self.handle
            .deliver_frame(frame.into())
            .await
            .expect("processor accepts frames");
    }

    pub async fn deliver_mini(&self, timestamp: u16, payload: &'static [u8]) {
        let mini = MiniFrame {
            address: self.address,
            source_call_number: REMOTE_CALL,
            timestamp,
            media: rvoip_iax2_core::frame::MediaKind::Audio,
            payload: Bytes::from_static(payload),
        };
        self.handle
            .deliver_frame(mini.into())
            .await
            .expect("processor accepts frames");
    }

    /// Next frame the processor transmitted
    pub async fn next_sent(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(1), self.outbound.recv())
            .await
            .expect("processor sent a frame in time")
            .expect("transmitter open")
    }

    pub async fn next_full(&mut self) -> FullFrame {
        match self.next_sent().await {
            Frame::Full(full) => full,
            Frame::Mini(mini) => panic!("expected a full frame, got {:?}", mini),
        }
    }

    /// Next transmitted full frame, which must be `kind`
    pub async fn expect(&mut self, kind: FrameKind) -> FullFrame {
        let frame = self.next_full().await;
        assert_eq!(frame.kind, kind, "unexpected frame {:?}", frame);
        frame
    }

    pub async fn expect_command(&mut self, command: ProtocolCommand) -> FullFrame {
        self.expect(FrameKind::Protocol(command)).await
    }

    /// Next frame must be the ACK of `acked`
    pub async fn expect_ack_of(&mut self, acked: &FullFrame) -> FullFrame {
        let ack = self.expect_command(ProtocolCommand::Ack).await;
        assert_eq!(ack.timestamp, acked.timestamp);
        assert_eq!(ack.sequence.out_seq, acked.sequence.out_seq);
        ack
    }

    /// Assert nothing else is transmitted once the processor goes idle
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(frame)) =
            tokio::time::timeout(Duration::from_millis(50), self.outbound.recv()).await
        {
            panic!("unexpected frame {:?}", frame);
        }
    }

    pub async fn next_event(&mut self) -> CallEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("event in time")
            .expect("event channel open")
    }

    /// Every event emitted so far
    pub fn drain_events(&mut self) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Every frame transmitted so far
    pub fn drain_sent(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Run an inbound call up to the point where RINGING is sent
    pub async fn accept_inbound_call(&mut self) -> FullFrame {
        let new = self.new_call();
        self.deliver(new.clone()).await;
        self.expect_ack_of(&new).await;
        let accept = self.expect_command(ProtocolCommand::Accept).await;
        self.deliver(self.ack(&accept)).await;
        self.expect(FrameKind::Control(SessionControl::Ringing)).await
    }

    /// Run an inbound call to the established state
    pub async fn establish_inbound_call(&mut self) {
        let ringing = self.accept_inbound_call().await;
        self.deliver(self.ack(&ringing)).await;
        self.handle.answer().await.unwrap();
        let answer = self.expect(FrameKind::Control(SessionControl::Answer)).await;
        self.deliver(self.ack(&answer)).await;
        self.wait_for(|s| s.answered).await;
    }

    /// Wait until the published state satisfies `check`
    pub async fn wait_for(&self, check: impl Fn(&CallStateSnapshot) -> bool) {
        let mut watch = self.handle.watch_state();
        tokio::time::timeout(Duration::from_secs(1), watch.wait_for(|s| check(s)))
            .await
            .expect("state reached in time")
            .expect("processor alive");
    }

    /// Wait for the worker task to finish
    pub async fn finished(self) -> (mpsc::UnboundedReceiver<Frame>, mpsc::UnboundedReceiver<CallEvent>) {
        tokio::time::timeout(Duration::from_secs(1), self.task)
            .await
            .expect("processor exits in time")
            .expect("processor did not panic");
        (self.outbound, self.events)
    }
}

/// Count transmitted full frames carrying `command`
pub fn count_command(frames: &[Frame], command: ProtocolCommand) -> usize {
    frames
        .iter()
        .filter(|f| matches!(f, Frame::Full(full) if full.is_command(command)))
        .count()
}

pub fn released(events: &[CallEvent]) -> Vec<ReleaseReason> {
    events
        .iter()
        .filter_map(|e| match e {
            CallEvent::Released { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .collect()
}
