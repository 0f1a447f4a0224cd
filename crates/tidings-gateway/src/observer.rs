/// Delivery observers: where per-destination dispatch outcomes go.
///
/// The notifier never propagates delivery failures; observers are the only
/// place they become visible.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use tidings_types::{DeliveryStatus, DispatchReport};

pub trait DeliveryObserver: Send + Sync {
    fn on_report(&self, report: &DispatchReport);
}

/// Observer that uses the `tracing` crate.
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn on_report(&self, report: &DispatchReport) {
        for outcome in &report.outcomes {
            match &outcome.status {
                DeliveryStatus::Delivered => debug!(
                    channel = %outcome.channel,
                    destination = %outcome.destination,
                    hash = %report.envelope_hash,
                    "delivered"
                ),
                DeliveryStatus::Failed { reason } => warn!(
                    channel = %outcome.channel,
                    destination = %outcome.destination,
                    hash = %report.envelope_hash,
                    "delivery failed: {}",
                    reason
                ),
                DeliveryStatus::Unresolved => warn!(
                    channel = %outcome.channel,
                    destination = %outcome.destination,
                    "destination not found in channel store"
                ),
            }
        }
        debug!(
            hash = %report.envelope_hash,
            messages = report.message_count,
            delivered = report.delivered(),
            failed = report.failed(),
            unresolved = report.unresolved(),
            "dispatch complete"
        );
    }
}

/// No-op observer that discards all reports.
pub struct NullObserver;

impl DeliveryObserver for NullObserver {
    fn on_report(&self, _report: &DispatchReport) {}
}

/// Keeps the most recent reports in memory, then forwards to `next`.
pub struct RecentDeliveries {
    capacity: usize,
    reports: Mutex<VecDeque<DispatchReport>>,
    next: Option<Arc<dyn DeliveryObserver>>,
}

impl RecentDeliveries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reports: Mutex::new(VecDeque::with_capacity(capacity)),
            next: None,
        }
    }

    pub fn with_next(mut self, next: Arc<dyn DeliveryObserver>) -> Self {
        self.next = Some(next);
        self
    }

    /// Retained reports, newest first.
    pub fn snapshot(&self) -> Vec<DispatchReport> {
        self.reports
            .lock()
            .map(|r| r.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

impl DeliveryObserver for RecentDeliveries {
    fn on_report(&self, report: &DispatchReport) {
        if self.capacity > 0 {
            if let Ok(mut reports) = self.reports.lock() {
                if reports.len() == self.capacity {
                    reports.pop_front();
                }
                reports.push_back(report.clone());
            }
        }
        if let Some(next) = &self.next {
            next.on_report(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report(hash: &str) -> DispatchReport {
        DispatchReport {
            envelope_hash: hash.into(),
            message_count: 1,
            dispatched_at: Utc::now(),
            outcomes: vec![],
        }
    }

    struct Counting(AtomicUsize);

    impl DeliveryObserver for Counting {
        fn on_report(&self, _report: &DispatchReport) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn keeps_newest_reports_up_to_capacity() {
        let recent = RecentDeliveries::new(2);
        for h in ["a", "b", "c"] {
            recent.on_report(&report(h));
        }
        let hashes: Vec<String> = recent.snapshot().into_iter().map(|r| r.envelope_hash).collect();
        assert_eq!(hashes, vec!["c", "b"]);
    }

    #[test]
    fn forwards_to_next_observer() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let recent = RecentDeliveries::new(0).with_next(counting.clone());
        recent.on_report(&report("a"));
        recent.on_report(&report("b"));
        assert_eq!(counting.0.load(Ordering::Relaxed), 2);
        assert!(recent.snapshot().is_empty());
    }
}
