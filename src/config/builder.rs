//! Validating builder for [`GatewayConfig`].

// self
use crate::{
	_prelude::*,
	config::{CounterBackend, GatewayConfig, StorageBackend, Timeouts},
	crypto::KeyRing,
	detect::Detector,
	error::ConfigError,
	rate_limit::RateLimitSettings,
	watermark::{BiasBounds, BiasNudger},
};

/// Builder for [`GatewayConfig`] values.
///
/// Every numeric setting starts at its documented default; only the key ring is mandatory.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	/// Signing keys; required.
	pub key_ring: Option<KeyRing>,
	/// Requests allowed per identity and window.
	pub limit_per_window: u32,
	/// Rate limit window length.
	pub window: Duration,
	/// Extra counter lifetime past the window.
	pub grace: Duration,
	/// Bias modulus.
	pub bias_range: u32,
	/// Bias offset.
	pub bias_offset: i32,
	/// Model vocabulary size used by detection.
	pub vocabulary_size: u32,
	/// Detection decision threshold.
	pub detection_threshold: f64,
	/// Deadline for counter store increments.
	pub counter_timeout: Duration,
	/// Deadline for provenance store operations.
	pub store_timeout: Duration,
	/// Rate limit counter backend.
	pub counters: CounterBackend,
	/// Provenance storage backend.
	pub storage: StorageBackend,
	/// Whether records keep the raw prompt text.
	pub persist_prompt_text: bool,
}
impl GatewayConfigBuilder {
	/// Creates a builder seeded with default settings.
	pub fn new() -> Self {
		Self {
			key_ring: None,
			limit_per_window: RateLimitSettings::DEFAULT_LIMIT,
			window: RateLimitSettings::DEFAULT_WINDOW,
			grace: RateLimitSettings::DEFAULT_GRACE,
			bias_range: BiasBounds::DEFAULT_RANGE,
			bias_offset: BiasBounds::DEFAULT_OFFSET,
			vocabulary_size: Detector::DEFAULT_VOCABULARY_SIZE,
			detection_threshold: Detector::DEFAULT_THRESHOLD,
			counter_timeout: Timeouts::DEFAULT_COUNTER,
			store_timeout: Timeouts::DEFAULT_STORE,
			counters: CounterBackend::Memory,
			storage: StorageBackend::Memory,
			persist_prompt_text: false,
		}
	}

	/// Sets the signing key ring.
	pub fn key_ring(mut self, key_ring: KeyRing) -> Self {
		self.key_ring = Some(key_ring);

		self
	}

	/// Sets the per-identity quota.
	pub fn rate_limit(mut self, limit_per_window: u32, window: Duration, grace: Duration) -> Self {
		self.limit_per_window = limit_per_window;
		self.window = window;
		self.grace = grace;

		self
	}

	/// Sets the bias range and offset.
	pub fn bias_bounds(mut self, range: u32, offset: i32) -> Self {
		self.bias_range = range;
		self.bias_offset = offset;

		self
	}

	/// Sets the model vocabulary size.
	pub fn vocabulary_size(mut self, vocabulary_size: u32) -> Self {
		self.vocabulary_size = vocabulary_size;

		self
	}

	/// Sets the detection decision threshold.
	pub fn detection_threshold(mut self, threshold: f64) -> Self {
		self.detection_threshold = threshold;

		self
	}

	/// Sets the counter store deadline.
	pub fn counter_timeout(mut self, timeout: Duration) -> Self {
		self.counter_timeout = timeout;

		self
	}

	/// Sets the provenance store deadline.
	pub fn store_timeout(mut self, timeout: Duration) -> Self {
		self.store_timeout = timeout;

		self
	}

	/// Selects where rate limit counters live.
	pub fn counter_backend(mut self, counters: CounterBackend) -> Self {
		self.counters = counters;

		self
	}

	/// Selects the provenance storage backend.
	pub fn storage(mut self, storage: StorageBackend) -> Self {
		self.storage = storage;

		self
	}

	/// Enables or disables copying raw prompts into records.
	pub fn persist_prompt_text(mut self, enabled: bool) -> Self {
		self.persist_prompt_text = enabled;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		let key_ring = self.key_ring.ok_or(ConfigError::MissingSecretKey)?;
		let rate_limit = RateLimitSettings::new(self.limit_per_window, self.window, self.grace)?;
		let bounds = BiasBounds::new(self.bias_range, self.bias_offset)?;
		let detector = Detector::new(
			BiasNudger::new(bounds),
			self.vocabulary_size,
			self.detection_threshold,
		)?;
		let timeouts = Timeouts::new(self.counter_timeout, self.store_timeout)?;

		validate_counters(&self.counters)?;
		validate_storage(&self.storage)?;

		Ok(GatewayConfig {
			key_ring,
			rate_limit,
			detector,
			timeouts,
			counters: self.counters,
			storage: self.storage,
			persist_prompt_text: self.persist_prompt_text,
		})
	}
}
impl Default for GatewayConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn validate_counters(counters: &CounterBackend) -> Result<(), ConfigError> {
	match counters {
		CounterBackend::Redis { url } if !matches!(url.scheme(), "redis" | "rediss") =>
			Err(ConfigError::InvalidCounterStoreUrl {
				reason: format!("unsupported scheme `{}`", url.scheme()),
			}),
		_ => Ok(()),
	}
}

fn validate_storage(storage: &StorageBackend) -> Result<(), ConfigError> {
	match storage {
		StorageBackend::File { path } if path.as_os_str().is_empty() =>
			Err(ConfigError::MissingSetting { name: "storage path" }),
		StorageBackend::Object { url, .. } if url.cannot_be_a_base() =>
			Err(ConfigError::InvalidObjectStoreUrl {
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			}),
		_ => Ok(()),
	}
}
