//! Gateway-level error types shared across signing, admission, storage, and detection.

// self
use crate::{_prelude::*, id::IdentifierError, rate_limit::RetryDirective};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity exceeded its quota for the current window; retry later.
	#[error("Rate limit exceeded; retry at {}.", .0.earliest_retry_at)]
	RateLimited(RetryDirective),
	/// Request rejected before any cryptographic work.
	#[error(transparent)]
	MalformedInput(#[from] InputError),
	/// Provenance or counter store failure (including timeouts).
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Downstream generation model failed; the caller may retry with a fresh request.
	#[error("{0}")]
	Downstream(
		#[from]
		#[source]
		DownstreamError,
	),
}
impl Error {
	/// Returns `true` when the failure is a quota denial rather than a fault.
	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Self::RateLimited(_))
	}
}

/// Configuration and validation failures raised while assembling the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// No secret key was supplied.
	#[error("Secret key is not configured.")]
	MissingSecretKey,
	/// The secret key was supplied but empty.
	#[error("Secret key cannot be empty.")]
	EmptySecretKey,
	/// A key identifier is malformed.
	#[error("Key identifier is invalid.")]
	InvalidKeyId {
		/// Underlying validation failure.
		#[source]
		source: IdentifierError,
	},
	/// Two keys in the ring share an identifier.
	#[error("Key ring already contains key `{id}`.")]
	DuplicateKeyId {
		/// Conflicting identifier.
		id: String,
	},
	/// Bias range must be positive and the offset must keep values within `i32`.
	#[error("Bias range {range} with offset {offset} is invalid.")]
	InvalidBiasBounds {
		/// Configured range.
		range: u32,
		/// Configured offset.
		offset: i32,
	},
	/// Rate limit settings are out of range.
	#[error("Rate limit setting is invalid: {reason}.")]
	InvalidRateLimit {
		/// Description of the violated constraint.
		reason: &'static str,
	},
	/// Store timeouts must be positive.
	#[error("The {store} timeout must be positive.")]
	InvalidTimeout {
		/// Which store the timeout applies to.
		store: &'static str,
	},
	/// Detection vocabulary must contain at least one token id.
	#[error("Detection vocabulary size must be positive.")]
	EmptyVocabulary,
	/// Detection threshold must lie in `[0, 1]`.
	#[error("Detection threshold {value} is outside [0, 1].")]
	InvalidThreshold {
		/// Configured threshold.
		value: f64,
	},
	/// A required setting is absent.
	#[error("Setting `{name}` is required.")]
	MissingSetting {
		/// Setting name.
		name: &'static str,
	},
	/// A setting could not be parsed.
	#[error("Setting `{name}` has invalid value `{value}`.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Raw value that failed to parse.
		value: String,
	},
	/// Storage backend label is not recognized.
	#[error("Storage backend `{value}` is not supported.")]
	UnknownStorageBackend {
		/// Raw backend label.
		value: String,
	},
	/// Counter backend label is not recognized or was not compiled in.
	#[error("Counter backend `{value}` is not supported.")]
	UnknownCounterBackend {
		/// Raw backend label.
		value: String,
	},
	/// Counter store URL cannot be parsed or names an unsupported scheme.
	#[error("Counter store URL is invalid: {reason}.")]
	InvalidCounterStoreUrl {
		/// Parser- or client-supplied reason.
		reason: String,
	},
	/// Object store base URL cannot be parsed or cannot hold path segments.
	#[error("Object store URL is invalid.")]
	InvalidObjectStoreUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Request-level validation failures.
#[derive(Debug, ThisError)]
pub enum InputError {
	/// Prompt is empty after normalization.
	#[error("Prompt text cannot be empty.")]
	EmptyPrompt,
	/// Caller identity failed validation.
	#[error("Caller identity is invalid.")]
	InvalidIdentity(#[from] IdentifierError),
	/// Claimed signature token cannot be decoded.
	#[error("Signature token is malformed: {reason}.")]
	MalformedSignature {
		/// Decoder-supplied reason string.
		reason: String,
	},
}

/// Opaque failure reported by the downstream generation model.
#[derive(Debug, ThisError)]
#[error("Generation model failed: {message}.")]
pub struct DownstreamError {
	/// Model- or transport-supplied message.
	pub message: String,
	/// Underlying failure, when available.
	#[source]
	pub source: Option<BoxError>,
}
impl DownstreamError {
	/// Creates an error carrying only a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), source: None }
	}

	/// Creates an error wrapping a transport- or model-specific failure.
	pub fn with_source(
		message: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self { message: message.into(), source: Some(Box::new(src)) }
	}
}
