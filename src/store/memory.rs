//! Thread-safe in-memory [`ProvenanceStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{ProvenanceLocation, ProvenanceStore, StoreError, StoreFuture},
	watermark::{ProvenanceRecord, SignatureToken},
};

type StoreMap = Arc<RwLock<HashMap<SignatureToken, ProvenanceRecord>>>;

/// Storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryProvenanceStore(StoreMap);
impl MemoryProvenanceStore {
	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true if no records are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn append_now(
		map: StoreMap,
		record: ProvenanceRecord,
	) -> Result<ProvenanceLocation, StoreError> {
		let mut guard = map.write();

		if guard.contains_key(&record.signature) {
			return Err(StoreError::conflict(&record.signature));
		}

		let location = ProvenanceLocation::new(format!("memory://{}", record.signature));

		guard.insert(record.signature, record);

		Ok(location)
	}

	fn lookup_now(map: StoreMap, signature: SignatureToken) -> Option<ProvenanceRecord> {
		map.read().get(&signature).cloned()
	}
}
impl ProvenanceStore for MemoryProvenanceStore {
	fn append(&self, record: ProvenanceRecord) -> StoreFuture<'_, ProvenanceLocation> {
		let map = self.0.clone();

		Box::pin(async move { Self::append_now(map, record) })
	}

	fn lookup<'a>(
		&'a self,
		signature: &'a SignatureToken,
	) -> StoreFuture<'a, Option<ProvenanceRecord>> {
		let map = self.0.clone();
		let signature = *signature;

		Box::pin(async move { Ok(Self::lookup_now(map, signature)) })
	}
}
