use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Relay counters, shared across request handlers
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: DateTime<Utc>,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    model_replies: AtomicU64,
    shell_commands: AtomicU64,
    shell_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_sec: i64,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub model_replies: u64,
    pub shell_commands: u64,
    pub shell_failures: u64,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            model_replies: AtomicU64::new(0),
            shell_commands: AtomicU64::new(0),
            shell_failures: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Request ended in an HTTP error (bad input or upstream failure)
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_reply(&self) {
        self.model_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shell(&self, success: bool) {
        self.shell_commands.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.shell_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            uptime_sec: (Utc::now() - self.started_at).num_seconds(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            model_replies: self.model_replies.load(Ordering::Relaxed),
            shell_commands: self.shell_commands.load(Ordering::Relaxed),
            shell_failures: self.shell_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let snap = RelayMetrics::new().snapshot();
        assert_eq!(snap.requests_total, 0);
        assert_eq!(snap.shell_commands, 0);
        assert!(snap.uptime_sec >= 0);
    }

    #[test]
    fn test_record_shell() {
        let metrics = RelayMetrics::new();
        metrics.record_shell(true);
        metrics.record_shell(false);
        metrics.record_shell(false);

        let snap = metrics.snapshot();
        assert_eq!(snap.shell_commands, 3);
        assert_eq!(snap.shell_failures, 2);
    }

    #[test]
    fn test_snapshot_serialization() {
        let metrics = RelayMetrics::new();
        metrics.record_request();
        metrics.record_failure();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["requests_total"], 1);
        assert_eq!(json["requests_failed"], 1);
        assert!(json["started_at"].is_string());
    }
}
