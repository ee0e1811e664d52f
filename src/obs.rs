//! Optional observability helpers for gateway operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run every gateway operation inside a `provenance_gateway.op` span with
//!   `op` and `stage` fields, and to emit `warn` events for denials and failures.
//! - Enable `metrics` to increment the `provenance_gateway_op_total` counter for every
//!   attempt/success/denial/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Gateway operations observed by the helpers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayOp {
	/// Signature issuance without a model call.
	Issue,
	/// Watermarked generation through a model.
	Generate,
	/// Detection of a claimed signature.
	Detect,
}
impl GatewayOp {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GatewayOp::Issue => "issue",
			GatewayOp::Generate => "generate",
			GatewayOp::Detect => "detect",
		}
	}
}
impl Display for GatewayOp {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a gateway operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Request refused by the rate limiter.
	Denied,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Denied => "denied",
			OpOutcome::Failure => "failure",
		}
	}

	/// Classifies a finished operation.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => OpOutcome::Success,
			Err(e) if e.is_rate_limited() => OpOutcome::Denied,
			Err(_) => OpOutcome::Failure,
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{error::InputError, rate_limit::RetryDirective};

	#[test]
	fn outcomes_classify_results() {
		let denied: Result<()> = Err(Error::RateLimited(RetryDirective::new(
			OffsetDateTime::UNIX_EPOCH,
			Duration::ZERO,
		)));
		let failed: Result<()> = Err(InputError::EmptyPrompt.into());

		assert_eq!(OpOutcome::of(&Ok(())), OpOutcome::Success);
		assert_eq!(OpOutcome::of(&denied), OpOutcome::Denied);
		assert_eq!(OpOutcome::of(&failed), OpOutcome::Failure);
		assert_eq!(GatewayOp::Generate.to_string(), "generate");
	}
}
