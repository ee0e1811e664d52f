//! Append-only provenance storage contracts and built-in backends.

pub mod file;
pub mod memory;
#[cfg(feature = "reqwest")] pub mod object;

pub use file::FileProvenanceStore;
pub use memory::MemoryProvenanceStore;
#[cfg(feature = "reqwest")] pub use object::ObjectProvenanceStore;

// self
use crate::{
	_prelude::*,
	watermark::{ProvenanceRecord, SignatureToken},
};

/// Boxed future returned by storage backends.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable, append-only home for provenance records.
///
/// Records are keyed by their signature token. A successful [`append`](Self::append) means the
/// whole record is durable and visible to [`lookup`](Self::lookup); a failed one must leave
/// nothing observable behind. Appending a second record for the same signature is a
/// [`StoreError::Conflict`].
pub trait ProvenanceStore
where
	Self: Send + Sync,
{
	/// Persists a record and returns where it landed.
	fn append(&self, record: ProvenanceRecord) -> StoreFuture<'_, ProvenanceLocation>;

	/// Fetches the record issued for `signature`, if present.
	fn lookup<'a>(
		&'a self,
		signature: &'a SignatureToken,
	) -> StoreFuture<'a, Option<ProvenanceRecord>>;
}

/// Opaque descriptor of where a record was written.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceLocation(String);
impl ProvenanceLocation {
	/// Wraps a backend-specific location string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Location string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ProvenanceLocation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Error type produced by provenance and counter stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A record already exists for the signature.
	#[error("A provenance record for signature {signature} already exists.")]
	Conflict {
		/// Encoded signature token.
		signature: String,
	},
	/// The operation did not complete within its deadline.
	#[error("The {operation} operation timed out after {timeout_ms} ms.")]
	Timeout {
		/// Operation label.
		operation: String,
		/// Deadline that elapsed, in milliseconds.
		timeout_ms: u64,
	},
}
impl StoreError {
	pub(crate) fn conflict(signature: &SignatureToken) -> Self {
		Self::Conflict { signature: signature.encode() }
	}
}

/// Default key prefix for object-store backends.
pub const DEFAULT_OBJECT_PREFIX: &str = "watermarks";

/// Object name under which a record is stored.
pub fn object_name(signature: &SignatureToken) -> String {
	format!("{signature}.json")
}
