//! Observability and Metrics
//!
//! Counters for message flow through the loopback queue, packet sends and the
//! connection table.
//!
//! A `Metrics` value is created by the caller and shared via `Arc` with the
//! endpoints that update it; there is no process-wide instance. Counters are
//! atomics so a transport I/O thread may read them without coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Messages appended to a loopback queue
    pub messages_posted: AtomicU64,
    /// Messages that reached a handler
    pub messages_delivered: AtomicU64,
    /// Messages with no registered handler
    pub messages_unhandled: AtomicU64,
    /// Packets accepted by the transport
    pub packets_sent: AtomicU64,
    /// Bytes accepted by the transport
    pub bytes_sent: AtomicU64,
    /// Sends deferred on a stalled reliable channel
    pub send_retries: AtomicU64,
    /// Sends that failed and dropped their data
    pub send_failures: AtomicU64,
    /// Connections added to a table
    pub connections_added: AtomicU64,
    /// Connections removed from a table
    pub connections_removed: AtomicU64,
    /// Inbound frames that failed to decode
    pub malformed_frames: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_posted: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            messages_unhandled: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_retries: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            connections_added: AtomicU64::new(0),
            connections_removed: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn message_posted(&self) {
        self.messages_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_unhandled(&self) {
        self.messages_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_added(&self) {
        self.connections_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_removed(&self) {
        self.connections_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_posted: self.messages_posted.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_unhandled: self.messages_unhandled.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connections_added: self.connections_added.load(Ordering::Relaxed),
            connections_removed: self.connections_removed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            messages_posted = snapshot.messages_posted,
            messages_delivered = snapshot.messages_delivered,
            messages_unhandled = snapshot.messages_unhandled,
            packets_sent = snapshot.packets_sent,
            bytes_sent = snapshot.bytes_sent,
            send_retries = snapshot.send_retries,
            send_failures = snapshot.send_failures,
            connections_added = snapshot.connections_added,
            connections_removed = snapshot.connections_removed,
            malformed_frames = snapshot.malformed_frames,
            uptime_seconds = snapshot.uptime_seconds,
            "Channel metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_posted: u64,
    pub messages_delivered: u64,
    pub messages_unhandled: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_retries: u64,
    pub send_failures: u64,
    pub connections_added: u64,
    pub connections_removed: u64,
    pub malformed_frames: u64,
    pub uptime_seconds: u64,
}

/// Logs the duration of a scope at debug level when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
