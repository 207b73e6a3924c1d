//! Relay runtime counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open TCP connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Login metrics
    pub logins_accepted: AtomicU64,
    pub logins_rejected: AtomicU64,

    // Message metrics
    /// Chat records appended to history and fanned out
    pub messages_broadcast: AtomicU64,
    /// Individual deliveries queued to recipients
    pub messages_delivered: AtomicU64,
    pub history_replays: AtomicU64,

    // Error metrics
    pub decode_errors: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn login_accepted(&self) {
        self.logins_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_rejected(&self) {
        self.logins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_broadcast(&self, deliveries: usize) {
        self.messages_broadcast.fetch_add(1, Ordering::Relaxed);
        self.messages_delivered
            .fetch_add(deliveries as u64, Ordering::Relaxed);
    }

    pub fn history_replayed(&self) {
        self.history_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            logins: LoginMetrics {
                accepted: self.logins_accepted.load(Ordering::Relaxed),
                rejected: self.logins_rejected.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                broadcast: self.messages_broadcast.load(Ordering::Relaxed),
                delivered: self.messages_delivered.load(Ordering::Relaxed),
                history_replays: self.history_replays.load(Ordering::Relaxed),
            },
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub logins: LoginMetrics,
    pub messages: MessageMetrics,
    pub decode_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginMetrics {
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub broadcast: u64,
    pub delivered: u64,
    pub history_replays: u64,
}
