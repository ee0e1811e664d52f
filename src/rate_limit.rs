//! Per-identity admission control over fixed time windows.
//!
//! Time is cut into `window`-sized buckets keyed by `floor(unix / window)`. Each admission
//! performs one atomic increment-with-expiry against a [`CounterStore`]; the post-increment
//! count alone decides the outcome, so concurrent callers can never both slip under the limit.

pub mod counter;
#[cfg(feature = "redis")] pub mod redis_counter;

pub use counter::*;
#[cfg(feature = "redis")] pub use redis_counter::*;

// self
use crate::{_prelude::*, error::ConfigError, id::Identity, store::StoreError};

/// Boxed future returned by [`RateLimitPolicy::evaluate`].
pub type RateLimitFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RateLimitDecision, StoreError>> + 'a + Send>>;

/// Strategy consulted before a request reaches the signer.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Evaluates whether the request may proceed.
	fn evaluate<'a>(&'a self, context: &'a RateLimitContext) -> RateLimitFuture<'a>;
}

/// Context shared with a [`RateLimitPolicy`] before a request is admitted.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Caller identity used as the partition key.
	pub identity: Identity,
	/// Per-request limit overriding the policy default.
	pub limit_override: Option<u32>,
	/// Timestamp the gateway observed before invoking the policy.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a new context for the given identity.
	pub fn new(identity: Identity) -> Self {
		Self { identity, limit_override: None, observed_at: OffsetDateTime::now_utc() }
	}

	/// Overrides the timestamp associated with the observation.
	pub fn with_observed_at(mut self, instant: OffsetDateTime) -> Self {
		self.observed_at = instant;

		self
	}

	/// Overrides the per-window limit for this evaluation.
	pub fn with_limit(mut self, limit_per_window: u32) -> Self {
		self.limit_override = Some(limit_per_window);

		self
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Allow,
	/// The identity exhausted its quota for the current window.
	Deny(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Deny`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Quota settings for [`FixedWindowLimiter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitSettings {
	limit_per_window: u32,
	window: Duration,
	grace: Duration,
}
impl RateLimitSettings {
	/// Default number of requests per window.
	pub const DEFAULT_LIMIT: u32 = 30;
	/// Default window length.
	pub const DEFAULT_WINDOW: Duration = Duration::seconds(60);
	/// Default extra lifetime of a counter past its window.
	pub const DEFAULT_GRACE: Duration = Duration::seconds(10);

	/// Validates quota settings. Windows are whole seconds.
	pub fn new(
		limit_per_window: u32,
		window: Duration,
		grace: Duration,
	) -> Result<Self, ConfigError> {
		if limit_per_window == 0 {
			return Err(ConfigError::InvalidRateLimit { reason: "limit must be positive" });
		}
		if window.whole_seconds() < 1 || window.subsec_nanoseconds() != 0 {
			return Err(ConfigError::InvalidRateLimit {
				reason: "window must be a positive whole number of seconds",
			});
		}
		if grace.is_negative() {
			return Err(ConfigError::InvalidRateLimit { reason: "grace cannot be negative" });
		}

		Ok(Self { limit_per_window, window, grace })
	}

	/// Requests allowed per identity and window.
	pub fn limit_per_window(&self) -> u32 {
		self.limit_per_window
	}

	/// Window length.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Extra counter lifetime past the window.
	pub fn grace(&self) -> Duration {
		self.grace
	}

	/// Window bucket containing `instant`.
	pub fn window_key(&self, instant: OffsetDateTime) -> i64 {
		instant.unix_timestamp().div_euclid(self.window.whole_seconds())
	}

	/// Start of the bucket following the one containing `instant`.
	pub fn next_window_start(&self, instant: OffsetDateTime) -> OffsetDateTime {
		let next = (self.window_key(instant) + 1) * self.window.whole_seconds();

		OffsetDateTime::UNIX_EPOCH + Duration::seconds(next)
	}
}
impl Default for RateLimitSettings {
	fn default() -> Self {
		Self {
			limit_per_window: Self::DEFAULT_LIMIT,
			window: Self::DEFAULT_WINDOW,
			grace: Self::DEFAULT_GRACE,
		}
	}
}

/// Fixed-window limiter backed by a shared [`CounterStore`].
#[derive(Clone)]
pub struct FixedWindowLimiter {
	counters: Arc<dyn CounterStore>,
	settings: RateLimitSettings,
}
impl FixedWindowLimiter {
	/// Creates a limiter over the provided counter store.
	pub fn new(counters: Arc<dyn CounterStore>, settings: RateLimitSettings) -> Self {
		Self { counters, settings }
	}

	/// Active quota settings.
	pub fn settings(&self) -> &RateLimitSettings {
		&self.settings
	}

	/// Counts one request for `identity` and decides whether it fits the quota.
	pub async fn admit(
		&self,
		identity: &Identity,
		limit_per_window: u32,
		now: OffsetDateTime,
	) -> Result<RateLimitDecision, StoreError> {
		let key = CounterKey::new(identity.clone(), self.settings.window_key(now));
		let ttl = self.settings.window + self.settings.grace;
		let count = self.counters.increment(&key, now, ttl).await?;

		if count <= u64::from(limit_per_window) {
			return Ok(RateLimitDecision::Allow);
		}

		let retry_at = self.settings.next_window_start(now);

		Ok(RateLimitDecision::Deny(
			RetryDirective::new(retry_at, retry_at - now)
				.with_reason(format!("{limit_per_window} requests per window exceeded")),
		))
	}
}
impl RateLimitPolicy for FixedWindowLimiter {
	fn evaluate<'a>(&'a self, context: &'a RateLimitContext) -> RateLimitFuture<'a> {
		let limit = context.limit_override.unwrap_or(self.settings.limit_per_window);

		Box::pin(self.admit(&context.identity, limit, context.observed_at))
	}
}
impl Debug for FixedWindowLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FixedWindowLimiter").field("settings", &self.settings).finish()
	}
}
