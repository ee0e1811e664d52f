// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{GatewayOp, OpOutcome};

/// Thread-safe counters for gateway operations.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
	issued: AtomicU64,
	denied: AtomicU64,
	failures: AtomicU64,
	detections: AtomicU64,
}
impl GatewayMetrics {
	/// Returns the number of signatures issued (including generations).
	pub fn issued(&self) -> u64 {
		self.issued.load(Ordering::Relaxed)
	}

	/// Returns the number of requests refused by the rate limiter.
	pub fn denied(&self) -> u64 {
		self.denied.load(Ordering::Relaxed)
	}

	/// Returns the number of failed operations.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of completed detections.
	pub fn detections(&self) -> u64 {
		self.detections.load(Ordering::Relaxed)
	}

	pub(crate) fn record(&self, op: GatewayOp, outcome: OpOutcome) {
		let counter = match (op, outcome) {
			(_, OpOutcome::Attempt) => return,
			(GatewayOp::Detect, OpOutcome::Success) => &self.detections,
			(_, OpOutcome::Success) => &self.issued,
			(_, OpOutcome::Denied) => &self.denied,
			(_, OpOutcome::Failure) => &self.failures,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}
}
