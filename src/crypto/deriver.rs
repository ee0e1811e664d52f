//! HMAC-SHA256 keyed derivation shared by signing and bias derivation.

// crates.io
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{_prelude::*, crypto::SecretKey};

type HmacSha256 = Hmac<Sha256>;

/// Output length of [`KeyedDeriver::derive`] in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-size keyed digest.
pub type Digest = [u8; DIGEST_LEN];

/// Deterministic keyed pseudorandom function (HMAC-SHA256).
///
/// The keyed state is computed once at construction and cloned for every derivation, so a
/// single deriver can be shared across threads without locking.
#[derive(Clone)]
pub struct KeyedDeriver(HmacSha256);
impl KeyedDeriver {
	/// Builds a deriver keyed by a validated secret.
	pub fn new(key: &SecretKey) -> Self {
		Self::keyed(key.expose())
	}

	/// Builds a deriver keyed by arbitrary bytes, such as a decoded signature seed.
	pub(crate) fn keyed(bytes: &[u8]) -> Self {
		match <HmacSha256 as Mac>::new_from_slice(bytes) {
			Ok(mac) => Self(mac),
			// HMAC pads or pre-hashes keys of any length.
			Err(_) => unreachable!("HMAC-SHA256 accepts keys of every length"),
		}
	}

	/// Computes the keyed digest of `message`.
	pub fn derive(&self, message: &[u8]) -> Digest {
		let mut mac = self.0.clone();

		mac.update(message);

		mac.finalize().into_bytes().into()
	}

	/// Checks `expected` against the keyed digest of `message` in constant time.
	pub fn verify(&self, message: &[u8], expected: &[u8]) -> bool {
		let mut mac = self.0.clone();

		mac.update(message);

		mac.verify_slice(expected).is_ok()
	}
}
impl Debug for KeyedDeriver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("KeyedDeriver(<redacted>)")
	}
}
