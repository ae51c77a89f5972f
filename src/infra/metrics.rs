//! Lock-free metrics collection
//!
//! Plain atomic counters updated from the lane loops and IO tasks,
//! reported periodically as a structured log line. Long-term analytics
//! live with the dashboard, not here.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Default)]
pub struct Metrics {
    candidates_received: AtomicU64,
    candidates_dropped: AtomicU64,
    votes_resolved: AtomicU64,
    admissions: AtomicU64,
    duplicate_entries: AtomicU64,
    exits: AtomicU64,
    unauthorized_exits: AtomicU64,
    settlements: AtomicU64,
    settlements_rejected: AtomicU64,
    revenue: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_candidate_received(&self) {
        self.candidates_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_dropped(&self) {
        self.candidates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_vote_resolved(&self) {
        self.votes_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission(&self) {
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_entry(&self) {
        self.duplicate_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exit(&self) {
        self.exits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized_exit(&self) {
        self.unauthorized_exits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement(&self, amount: u64) {
        self.settlements.fetch_add(1, Ordering::Relaxed);
        self.revenue.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_settlement_rejected(&self) {
        self.settlements_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters (lock-free reads)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            candidates_received: self.candidates_received.load(Ordering::Relaxed),
            candidates_dropped: self.candidates_dropped.load(Ordering::Relaxed),
            votes_resolved: self.votes_resolved.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            duplicate_entries: self.duplicate_entries.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            unauthorized_exits: self.unauthorized_exits.load(Ordering::Relaxed),
            settlements: self.settlements.load(Ordering::Relaxed),
            settlements_rejected: self.settlements_rejected.load(Ordering::Relaxed),
            revenue: self.revenue.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub candidates_received: u64,
    pub candidates_dropped: u64,
    pub votes_resolved: u64,
    pub admissions: u64,
    pub duplicate_entries: u64,
    pub exits: u64,
    pub unauthorized_exits: u64,
    pub settlements: u64,
    pub settlements_rejected: u64,
    pub revenue: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            candidates = %self.candidates_received,
            dropped = %self.candidates_dropped,
            votes = %self.votes_resolved,
            admissions = %self.admissions,
            duplicates = %self.duplicate_entries,
            exits = %self.exits,
            unauthorized = %self.unauthorized_exits,
            settlements = %self.settlements,
            rejected = %self.settlements_rejected,
            revenue = %self.revenue,
            "metrics_summary"
        );
    }
}
