//! Secret key wrapper and the versioned key ring used for signing and verification.

// crates.io
use rand::RngCore;
// self
use crate::{_prelude::*, error::ConfigError, id::KeyId};

/// Redacted secret key wrapper keeping key material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Arc<[u8]>);
impl SecretKey {
	/// Length of keys produced by [`SecretKey::generate`].
	pub const GENERATED_LEN: usize = 32;

	/// Wraps key material, rejecting empty input.
	pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let bytes = bytes.as_ref();

		if bytes.is_empty() {
			return Err(ConfigError::EmptySecretKey);
		}

		Ok(Self(Arc::from(bytes)))
	}

	/// Generates a fresh random key for rotation tooling and tests.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; Self::GENERATED_LEN];

		rand::rng().fill_bytes(&mut bytes);

		Self(Arc::from(bytes.as_slice()))
	}

	/// Returns the raw key bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SecretKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SecretKey").field(&"<redacted>").finish()
	}
}
impl Display for SecretKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Versioned set of signing keys.
///
/// New signatures are always minted with the active key. Retired keys stay in the ring so
/// records signed before a rotation still verify.
#[derive(Clone, Debug)]
pub struct KeyRing {
	active: KeyId,
	keys: BTreeMap<KeyId, SecretKey>,
}
impl KeyRing {
	/// Creates a ring holding a single active key.
	pub fn new(active: KeyId, key: SecretKey) -> Self {
		let keys = BTreeMap::from([(active.clone(), key)]);

		Self { active, keys }
	}

	/// Adds a retired key that is only used for verification.
	pub fn with_retired(mut self, id: KeyId, key: SecretKey) -> Result<Self, ConfigError> {
		if self.keys.contains_key(&id) {
			return Err(ConfigError::DuplicateKeyId { id: id.to_string() });
		}

		self.keys.insert(id, key);

		Ok(self)
	}

	/// Promotes a new key to active, keeping the previous one for verification.
	pub fn rotate(mut self, id: KeyId, key: SecretKey) -> Result<Self, ConfigError> {
		if self.keys.contains_key(&id) {
			return Err(ConfigError::DuplicateKeyId { id: id.to_string() });
		}

		self.keys.insert(id.clone(), key);
		self.active = id;

		Ok(self)
	}

	/// Identifier of the key used for new signatures.
	pub fn active_id(&self) -> &KeyId {
		&self.active
	}

	/// Key used for new signatures.
	pub fn active(&self) -> &SecretKey {
		// The active id is inserted by every constructor and never removed.
		&self.keys[&self.active]
	}

	/// Iterates every key in the ring, active key included.
	pub fn iter(&self) -> impl Iterator<Item = (&KeyId, &SecretKey)> {
		self.keys.iter()
	}

	/// Number of keys held by the ring.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Always false; a ring holds at least its active key.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}
