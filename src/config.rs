//! Gateway configuration assembled once at startup.
//!
//! [`GatewayConfig`] is built through [`GatewayConfigBuilder`] or loaded from `WATERMARK_*`
//! environment variables with [`GatewayConfig::from_env`]. It is passed by value into
//! [`Gateway::new`](crate::gateway::Gateway::new); nothing reads the environment afterwards.

pub mod builder;

pub use builder::*;

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	crypto::{KeyRing, SecretKey},
	detect::Detector,
	error::ConfigError,
	id::KeyId,
	rate_limit::{CounterStore, MemoryCounterStore, RateLimitSettings},
	store::{DEFAULT_OBJECT_PREFIX, FileProvenanceStore, MemoryProvenanceStore, ProvenanceStore},
	watermark::BiasBounds,
};

/// Active signing key (required).
pub const ENV_KEY: &str = "WATERMARK_KEY";
/// Identifier of the active key.
pub const ENV_KEY_ID: &str = "WATERMARK_KEY_ID";
/// Retired verification keys as `id=secret` pairs separated by commas.
pub const ENV_RETIRED_KEYS: &str = "WATERMARK_RETIRED_KEYS";
/// Requests allowed per identity and window.
pub const ENV_RATE_LIMIT_PER_WINDOW: &str = "WATERMARK_RATE_LIMIT_PER_WINDOW";
/// Window length in seconds.
pub const ENV_RATE_LIMIT_WINDOW_SECONDS: &str = "WATERMARK_RATE_LIMIT_WINDOW_SECONDS";
/// Counter lifetime past the window in seconds.
pub const ENV_RATE_LIMIT_GRACE_SECONDS: &str = "WATERMARK_RATE_LIMIT_GRACE_SECONDS";
/// Bias modulus.
pub const ENV_BIAS_RANGE: &str = "WATERMARK_BIAS_RANGE";
/// Bias offset.
pub const ENV_BIAS_OFFSET: &str = "WATERMARK_BIAS_OFFSET";
/// Model vocabulary size.
pub const ENV_VOCABULARY_SIZE: &str = "WATERMARK_VOCABULARY_SIZE";
/// Detection decision threshold.
pub const ENV_DETECTION_THRESHOLD: &str = "WATERMARK_DETECTION_THRESHOLD";
/// Counter store deadline in milliseconds.
pub const ENV_COUNTER_TIMEOUT_MS: &str = "WATERMARK_COUNTER_TIMEOUT_MS";
/// Provenance store deadline in milliseconds.
pub const ENV_STORE_TIMEOUT_MS: &str = "WATERMARK_STORE_TIMEOUT_MS";
/// `memory` or `redis`.
pub const ENV_COUNTER_BACKEND: &str = "WATERMARK_COUNTER_BACKEND";
/// Server URL for the `redis` counter backend.
pub const ENV_REDIS_URL: &str = "WATERMARK_REDIS_URL";
/// `memory`, `file`, or `object`.
pub const ENV_STORAGE_BACKEND: &str = "WATERMARK_STORAGE_BACKEND";
/// Journal path for the file backend.
pub const ENV_STORAGE_PATH: &str = "WATERMARK_STORAGE_PATH";
/// Bucket URL for the object backend.
pub const ENV_OBJECT_STORE_URL: &str = "WATERMARK_OBJECT_STORE_URL";
/// Key prefix for the object backend.
pub const ENV_OBJECT_STORE_PREFIX: &str = "WATERMARK_OBJECT_STORE_PREFIX";
/// Whether records keep the raw prompt text.
pub const ENV_PERSIST_PROMPT: &str = "WATERMARK_PERSIST_PROMPT";

const DEFAULT_KEY_ID: &str = "primary";

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Signing and verification keys.
	pub key_ring: KeyRing,
	/// Per-identity quota.
	pub rate_limit: RateLimitSettings,
	/// Detection settings, including the bias bounds shared with generation.
	pub detector: Detector,
	/// Store deadlines.
	pub timeouts: Timeouts,
	/// Rate limit counter backend.
	pub counters: CounterBackend,
	/// Provenance storage backend.
	pub storage: StorageBackend,
	/// Whether records keep the raw prompt text.
	pub persist_prompt_text: bool,
}
impl GatewayConfig {
	/// Returns a builder seeded with defaults.
	pub fn builder() -> GatewayConfigBuilder {
		GatewayConfigBuilder::new()
	}

	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads configuration through `lookup`, which maps a variable name to its value.
	///
	/// Blank values are treated as unset.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let secret = get(ENV_KEY).ok_or(ConfigError::MissingSecretKey)?;
		let key_id = get(ENV_KEY_ID).unwrap_or_else(|| DEFAULT_KEY_ID.into());
		let mut key_ring = KeyRing::new(parse_key_id(&key_id)?, SecretKey::new(secret)?);

		if let Some(retired) = get(ENV_RETIRED_KEYS) {
			for (id, key) in parse_retired_keys(&retired)? {
				key_ring = key_ring.with_retired(id, key)?;
			}
		}

		let limit = parse_or(&get, ENV_RATE_LIMIT_PER_WINDOW, RateLimitSettings::DEFAULT_LIMIT)?;
		let window = parse_or(
			&get,
			ENV_RATE_LIMIT_WINDOW_SECONDS,
			RateLimitSettings::DEFAULT_WINDOW.whole_seconds(),
		)?;
		let grace = parse_or(
			&get,
			ENV_RATE_LIMIT_GRACE_SECONDS,
			RateLimitSettings::DEFAULT_GRACE.whole_seconds(),
		)?;
		let range = parse_or(&get, ENV_BIAS_RANGE, BiasBounds::DEFAULT_RANGE)?;
		let offset = parse_or(&get, ENV_BIAS_OFFSET, BiasBounds::DEFAULT_OFFSET)?;
		let vocabulary_size =
			parse_or(&get, ENV_VOCABULARY_SIZE, Detector::DEFAULT_VOCABULARY_SIZE)?;
		let threshold = parse_or(&get, ENV_DETECTION_THRESHOLD, Detector::DEFAULT_THRESHOLD)?;
		let counter_timeout_ms = parse_or(
			&get,
			ENV_COUNTER_TIMEOUT_MS,
			Timeouts::DEFAULT_COUNTER.whole_milliseconds() as i64,
		)?;
		let store_timeout_ms = parse_or(
			&get,
			ENV_STORE_TIMEOUT_MS,
			Timeouts::DEFAULT_STORE.whole_milliseconds() as i64,
		)?;
		let persist_prompt_text = match get(ENV_PERSIST_PROMPT) {
			Some(value) => parse_flag(ENV_PERSIST_PROMPT, &value)?,
			None => false,
		};
		let counters = CounterBackend::from_lookup(&get)?;
		let storage = StorageBackend::from_lookup(&get)?;

		GatewayConfigBuilder::new()
			.key_ring(key_ring)
			.rate_limit(limit, Duration::seconds(window), Duration::seconds(grace))
			.bias_bounds(range, offset)
			.vocabulary_size(vocabulary_size)
			.detection_threshold(threshold)
			.counter_timeout(Duration::milliseconds(counter_timeout_ms))
			.store_timeout(Duration::milliseconds(store_timeout_ms))
			.counter_backend(counters)
			.storage(storage)
			.persist_prompt_text(persist_prompt_text)
			.build()
	}

	/// Bias bounds shared by generation and detection.
	pub fn bias_bounds(&self) -> BiasBounds {
		self.detector.nudger().bounds()
	}
}

/// Deadlines applied to store calls on the request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
	counter: Duration,
	store: Duration,
}
impl Timeouts {
	/// Default counter store deadline.
	pub const DEFAULT_COUNTER: Duration = Duration::milliseconds(50);
	/// Default provenance store deadline.
	pub const DEFAULT_STORE: Duration = Duration::milliseconds(250);

	/// Validates that both deadlines are positive.
	pub fn new(counter: Duration, store: Duration) -> Result<Self, ConfigError> {
		if !counter.is_positive() {
			return Err(ConfigError::InvalidTimeout { store: "counter" });
		}
		if !store.is_positive() {
			return Err(ConfigError::InvalidTimeout { store: "provenance" });
		}

		Ok(Self { counter, store })
	}

	/// Counter store deadline.
	pub fn counter(&self) -> Duration {
		self.counter
	}

	/// Provenance store deadline.
	pub fn store(&self) -> Duration {
		self.store
	}
}
impl Default for Timeouts {
	fn default() -> Self {
		Self { counter: Self::DEFAULT_COUNTER, store: Self::DEFAULT_STORE }
	}
}

/// Where rate limit counters live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterBackend {
	/// In-process counters; every gateway instance enforces its own quota.
	Memory,
	/// Redis counters shared by every replica (requires the `redis` feature).
	Redis {
		/// Server URL (`redis://` or `rediss://`).
		url: Url,
	},
}
impl CounterBackend {
	/// Opens the configured backend.
	pub fn open(&self) -> Result<Arc<dyn CounterStore>> {
		match self {
			Self::Memory => Ok(Arc::new(MemoryCounterStore::default())),
			#[cfg(feature = "redis")]
			Self::Redis { url } => Ok(Arc::new(crate::rate_limit::RedisCounterStore::new(url)?)),
			#[cfg(not(feature = "redis"))]
			Self::Redis { .. } =>
				Err(ConfigError::UnknownCounterBackend { value: "redis".into() }.into()),
		}
	}

	/// Stable label of the backend kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
			Self::Redis { .. } => "redis",
		}
	}

	fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let kind = get(ENV_COUNTER_BACKEND).unwrap_or_else(|| "memory".into());

		match kind.trim().to_ascii_lowercase().as_str() {
			"memory" => Ok(Self::Memory),
			"redis" => {
				let raw = get(ENV_REDIS_URL)
					.ok_or(ConfigError::MissingSetting { name: ENV_REDIS_URL })?;
				// Never echo the URL back; it may carry a password.
				let url = Url::parse(raw.trim())
					.map_err(|e| ConfigError::InvalidCounterStoreUrl { reason: e.to_string() })?;

				Ok(Self::Redis { url })
			},
			_ => Err(ConfigError::UnknownCounterBackend { value: kind }),
		}
	}
}

/// Where provenance records are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
	/// In-process map; records are lost on restart.
	Memory,
	/// JSON Lines journal on local disk.
	File {
		/// Journal path.
		path: PathBuf,
	},
	/// HTTP object store (requires the `reqwest` feature).
	Object {
		/// Bucket base URL.
		url: Url,
		/// Key prefix inside the bucket.
		prefix: String,
	},
}
impl StorageBackend {
	/// Opens the configured backend.
	pub fn open(&self) -> Result<Arc<dyn ProvenanceStore>> {
		match self {
			Self::Memory => Ok(Arc::new(MemoryProvenanceStore::default())),
			Self::File { path } => Ok(Arc::new(FileProvenanceStore::open(path)?)),
			#[cfg(feature = "reqwest")]
			Self::Object { url, prefix } => Ok(Arc::new(
				crate::store::ObjectProvenanceStore::new(url.clone(), prefix.clone())?,
			)),
			#[cfg(not(feature = "reqwest"))]
			Self::Object { .. } =>
				Err(ConfigError::UnknownStorageBackend { value: "object".into() }.into()),
		}
	}

	/// Stable label of the backend kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Memory => "memory",
			Self::File { .. } => "file",
			Self::Object { .. } => "object",
		}
	}

	fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let kind = get(ENV_STORAGE_BACKEND).unwrap_or_else(|| "memory".into());

		match kind.trim().to_ascii_lowercase().as_str() {
			"memory" => Ok(Self::Memory),
			"file" => {
				let path = get(ENV_STORAGE_PATH)
					.ok_or(ConfigError::MissingSetting { name: ENV_STORAGE_PATH })?;

				Ok(Self::File { path: PathBuf::from(path.trim()) })
			},
			"object" => {
				let raw = get(ENV_OBJECT_STORE_URL)
					.ok_or(ConfigError::MissingSetting { name: ENV_OBJECT_STORE_URL })?;
				let url = Url::parse(raw.trim())
					.map_err(|source| ConfigError::InvalidObjectStoreUrl { source })?;
				let prefix =
					get(ENV_OBJECT_STORE_PREFIX).unwrap_or_else(|| DEFAULT_OBJECT_PREFIX.into());

				Ok(Self::Object { url, prefix })
			},
			_ => Err(ConfigError::UnknownStorageBackend { value: kind }),
		}
	}
}

fn parse_key_id(value: &str) -> Result<KeyId, ConfigError> {
	KeyId::new(value.trim()).map_err(|source| ConfigError::InvalidKeyId { source })
}

fn parse_retired_keys(value: &str) -> Result<Vec<(KeyId, SecretKey)>, ConfigError> {
	value
		.split(',')
		.map(str::trim)
		.filter(|entry| !entry.is_empty())
		.map(|entry| {
			// Never echo the entry back; it may hold key material.
			let (id, secret) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidSetting {
				name: ENV_RETIRED_KEYS,
				value: "<redacted>".into(),
			})?;

			Ok((parse_key_id(id)?, SecretKey::new(secret.trim())?))
		})
		.collect()
}

fn parse_or<F, T>(get: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
	F: Fn(&str) -> Option<String>,
	T: FromStr,
{
	match get(name) {
		Some(raw) => raw
			.trim()
			.parse()
			.map_err(|_| ConfigError::InvalidSetting { name, value: raw.clone() }),
		None => Ok(default),
	}
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
	match raw.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::InvalidSetting { name, value: raw.into() }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
		move |name: &str| {
			vars.iter().find(|(key, _)| *key == name).map(|(_, value)| value.to_string())
		}
	}

	#[test]
	fn defaults_apply_when_only_the_key_is_set() {
		let config = GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1")]))
			.expect("Minimal configuration should load.");

		assert_eq!(config.key_ring.active_id().to_string(), "primary");
		assert_eq!(config.key_ring.active().expose(), b"k1");
		assert_eq!(config.rate_limit, RateLimitSettings::default());
		assert_eq!(config.bias_bounds(), BiasBounds::default());
		assert_eq!(config.detector.vocabulary_size(), 50_257);
		assert_eq!(config.detector.threshold(), 0.99);
		assert_eq!(config.timeouts, Timeouts::default());
		assert_eq!(config.counters, CounterBackend::Memory);
		assert_eq!(config.storage, StorageBackend::Memory);
		assert!(!config.persist_prompt_text);
	}

	#[test]
	fn redis_counter_backend_is_read() {
		let vars = [
			(ENV_KEY, "k1"),
			(ENV_COUNTER_BACKEND, "Redis"),
			(ENV_REDIS_URL, " redis://cache.internal:6379/2 "),
		];
		let config =
			GatewayConfig::from_lookup(lookup(&vars)).expect("Redis configuration should load.");

		let url = Url::parse("redis://cache.internal:6379/2").expect("URL fixture should parse.");

		assert_eq!(config.counters, CounterBackend::Redis { url });
		assert_eq!(config.counters.as_str(), "redis");
	}

	#[test]
	fn invalid_counter_backends_are_rejected() {
		fn load(backend: &str, url: Option<&str>) -> Result<GatewayConfig, ConfigError> {
			let mut vars = vec![(ENV_KEY, "k1"), (ENV_COUNTER_BACKEND, backend)];

			vars.extend(url.map(|url| (ENV_REDIS_URL, url)));

			GatewayConfig::from_lookup(lookup(&vars))
		}

		assert!(matches!(
			load("redis", None),
			Err(ConfigError::MissingSetting { name: ENV_REDIS_URL })
		));
		assert!(matches!(
			load("memcached", None),
			Err(ConfigError::UnknownCounterBackend { value }) if value == "memcached"
		));
		assert!(matches!(
			load("redis", Some("not a url")),
			Err(ConfigError::InvalidCounterStoreUrl { .. })
		));
		assert!(matches!(
			load("redis", Some("https://cache.internal/")),
			Err(ConfigError::InvalidCounterStoreUrl { reason }) if reason.contains("https")
		));
	}

	#[test]
	fn every_setting_is_read() {
		let vars = [
			(ENV_KEY, "k2"),
			(ENV_KEY_ID, "2026-10"),
			(ENV_RETIRED_KEYS, "2026-01=old-secret, 2025-07=older-secret"),
			(ENV_RATE_LIMIT_PER_WINDOW, "3"),
			(ENV_RATE_LIMIT_WINDOW_SECONDS, "20"),
			(ENV_RATE_LIMIT_GRACE_SECONDS, "5"),
			(ENV_BIAS_RANGE, "11"),
			(ENV_BIAS_OFFSET, "5"),
			(ENV_VOCABULARY_SIZE, "1000"),
			(ENV_DETECTION_THRESHOLD, "0.95"),
			(ENV_COUNTER_TIMEOUT_MS, "20"),
			(ENV_STORE_TIMEOUT_MS, "500"),
			(ENV_STORAGE_BACKEND, "File"),
			(ENV_STORAGE_PATH, "/var/lib/watermarks/journal.jsonl"),
			(ENV_PERSIST_PROMPT, "yes"),
		];
		let config =
			GatewayConfig::from_lookup(lookup(&vars)).expect("Full configuration should load.");

		assert_eq!(config.key_ring.active_id().to_string(), "2026-10");
		assert_eq!(config.key_ring.len(), 3);
		assert_eq!(config.rate_limit.limit_per_window(), 3);
		assert_eq!(config.rate_limit.window(), Duration::seconds(20));
		assert_eq!(config.rate_limit.grace(), Duration::seconds(5));
		assert_eq!(config.bias_bounds().max(), 5);
		assert_eq!(config.detector.vocabulary_size(), 1000);
		assert_eq!(config.timeouts.counter(), Duration::milliseconds(20));
		assert_eq!(config.timeouts.store(), Duration::milliseconds(500));
		assert_eq!(
			config.storage,
			StorageBackend::File { path: PathBuf::from("/var/lib/watermarks/journal.jsonl") }
		);
		assert!(config.persist_prompt_text);
	}

	#[test]
	fn object_backend_defaults_its_prefix() {
		let vars = [
			(ENV_KEY, "k1"),
			(ENV_STORAGE_BACKEND, "object"),
			(ENV_OBJECT_STORE_URL, "https://bucket.example/provenance"),
		];
		let config =
			GatewayConfig::from_lookup(lookup(&vars)).expect("Object configuration should load.");

		assert_eq!(
			config.storage,
			StorageBackend::Object {
				url: Url::parse("https://bucket.example/provenance")
					.expect("URL fixture should parse."),
				prefix: "watermarks".into(),
			}
		);
	}

	#[test]
	fn missing_or_empty_keys_are_fatal() {
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[])),
			Err(ConfigError::MissingSecretKey)
		));
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "   ")])),
			Err(ConfigError::MissingSecretKey)
		));
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1"), (ENV_RETIRED_KEYS, "old=")])),
			Err(ConfigError::EmptySecretKey)
		));
	}

	#[test]
	fn invalid_numbers_are_rejected() {
		for (name, value) in [
			(ENV_RATE_LIMIT_PER_WINDOW, "many"),
			(ENV_RATE_LIMIT_PER_WINDOW, "-1"),
			(ENV_BIAS_RANGE, "2.5"),
			(ENV_DETECTION_THRESHOLD, "high"),
			(ENV_STORE_TIMEOUT_MS, "fast"),
			(ENV_PERSIST_PROMPT, "maybe"),
		] {
			let result = GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1"), (name, value)]));

			assert!(
				matches!(&result, Err(ConfigError::InvalidSetting { name: n, .. }) if *n == name),
				"{name}={value} should be rejected, got {result:?}."
			);
		}
	}

	#[test]
	fn out_of_range_values_fail_validation() {
		let cases: [(&str, &str); 5] = [
			(ENV_RATE_LIMIT_PER_WINDOW, "0"),
			(ENV_BIAS_RANGE, "0"),
			(ENV_VOCABULARY_SIZE, "0"),
			(ENV_DETECTION_THRESHOLD, "1.5"),
			(ENV_COUNTER_TIMEOUT_MS, "0"),
		];

		for (name, value) in cases {
			assert!(
				GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1"), (name, value)])).is_err(),
				"{name}={value} should fail validation."
			);
		}
	}

	#[test]
	fn storage_settings_are_validated() {
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1"), (ENV_STORAGE_BACKEND, "s3")])),
			Err(ConfigError::UnknownStorageBackend { value }) if value == "s3"
		));
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[(ENV_KEY, "k1"), (ENV_STORAGE_BACKEND, "file")])),
			Err(ConfigError::MissingSetting { name: ENV_STORAGE_PATH })
		));
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[
				(ENV_KEY, "k1"),
				(ENV_STORAGE_BACKEND, "object"),
				(ENV_OBJECT_STORE_URL, "not a url"),
			])),
			Err(ConfigError::InvalidObjectStoreUrl { .. })
		));
	}

	#[test]
	fn retired_key_entries_must_name_an_id() {
		let result = GatewayConfig::from_lookup(lookup(&[
			(ENV_KEY, "k1"),
			(ENV_RETIRED_KEYS, "leaked-secret"),
		]));

		let Err(ConfigError::InvalidSetting { value, .. }) = result else {
			panic!("Retired key without an id should be rejected.");
		};

		assert!(!value.contains("leaked-secret"));
	}

	#[test]
	fn duplicate_key_ids_are_rejected() {
		assert!(matches!(
			GatewayConfig::from_lookup(lookup(&[
				(ENV_KEY, "k1"),
				(ENV_RETIRED_KEYS, "primary=other"),
			])),
			Err(ConfigError::DuplicateKeyId { .. })
		));
	}

	#[test]
	fn builder_requires_a_key_ring() {
		assert!(matches!(GatewayConfig::builder().build(), Err(ConfigError::MissingSecretKey)));
	}
}
