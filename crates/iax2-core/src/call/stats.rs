//! Per-call traffic counters
//!
//! The worker is the only writer. Any task holding the `Arc` may read, so every
//! counter is an atomic and readers go through [`CallStatistics::snapshot`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Traffic class a frame is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficClass {
    Control,
    Audio,
    Video,
}

#[derive(Debug, Default)]
struct Counter {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl Counter {
    fn add(&self, bytes: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn load(&self) -> (u64, u64) {
        (
            self.frames.load(Ordering::Relaxed),
            self.bytes.load(Ordering::Relaxed),
        )
    }
}

/// Live counters shared between the worker and readers
#[derive(Debug, Default)]
pub struct CallStatistics {
    control_sent: Counter,
    control_received: Counter,
    audio_sent: Counter,
    audio_received: Counter,
    video_sent: Counter,
    video_received: Counter,
    /// Last measured round trip, milliseconds
    last_rtt_ms: AtomicU32,
    pings_sent: AtomicU64,
    pongs_received: AtomicU64,
}

impl CallStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, class: TrafficClass, bytes: usize) {
        match class {
            TrafficClass::Control => self.control_sent.add(bytes),
            TrafficClass::Audio => self.audio_sent.add(bytes),
            TrafficClass::Video => self.video_sent.add(bytes),
        }
    }

    pub fn record_received(&self, class: TrafficClass, bytes: usize) {
        match class {
            TrafficClass::Control => self.control_received.add(bytes),
            TrafficClass::Audio => self.audio_received.add(bytes),
            TrafficClass::Video => self.video_received.add(bytes),
        }
    }

    pub fn record_rtt(&self, rtt_ms: u32) {
        self.last_rtt_ms.store(rtt_ms, Ordering::Relaxed);
    }

    pub fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.pongs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let (control_frames_sent, control_bytes_sent) = self.control_sent.load();
        let (control_frames_received, control_bytes_received) = self.control_received.load();
        let (audio_frames_sent, audio_bytes_sent) = self.audio_sent.load();
        let (audio_frames_received, audio_bytes_received) = self.audio_received.load();
        let (video_frames_sent, video_bytes_sent) = self.video_sent.load();
        let (video_frames_received, video_bytes_received) = self.video_received.load();
        StatisticsSnapshot {
            control_frames_sent,
            control_bytes_sent,
            control_frames_received,
            control_bytes_received,
            audio_frames_sent,
            audio_bytes_sent,
            audio_frames_received,
            audio_bytes_received,
            video_frames_sent,
            video_bytes_sent,
            video_frames_received,
            video_bytes_received,
            last_rtt_ms: self.last_rtt_ms.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            pongs_received: self.pongs_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CallStatistics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub control_frames_sent: u64,
    pub control_bytes_sent: u64,
    pub control_frames_received: u64,
    pub control_bytes_received: u64,
    pub audio_frames_sent: u64,
    pub audio_bytes_sent: u64,
    pub audio_frames_received: u64,
    pub audio_bytes_received: u64,
    pub video_frames_sent: u64,
    pub video_bytes_sent: u64,
    pub video_frames_received: u64,
    pub video_bytes_received: u64,
    pub last_rtt_ms: u32,
    pub pings_sent: u64,
    pub pongs_received: u64,
}
