//! Deterministic per-token bias derivation seeded by a signature token.

// self
use crate::{_prelude::*, crypto::KeyedDeriver, error::ConfigError, watermark::SignatureToken};

/// Token identifier in the downstream model's vocabulary.
pub type TokenId = u32;

/// Score adjustment per candidate token id.
pub type BiasMap = BTreeMap<TokenId, i32>;

/// Symmetric bounded range that raw digests are folded into.
///
/// A bias is `(value mod range) - offset`, so every value lies in
/// `[-offset, range - offset - 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BiasBounds {
	range: u32,
	offset: i32,
}
impl BiasBounds {
	/// Default modulus.
	pub const DEFAULT_RANGE: u32 = 25;
	/// Default offset, yielding biases in `[-12, 12]`.
	pub const DEFAULT_OFFSET: i32 = 12;

	/// Validates a range/offset pair.
	pub fn new(range: u32, offset: i32) -> Result<Self, ConfigError> {
		let min = -i64::from(offset);
		let max = i64::from(range) - 1 - i64::from(offset);

		if range == 0 || min < i64::from(i32::MIN) || max > i64::from(i32::MAX) {
			return Err(ConfigError::InvalidBiasBounds { range, offset });
		}

		Ok(Self { range, offset })
	}

	/// Configured modulus.
	pub fn range(&self) -> u32 {
		self.range
	}

	/// Configured offset.
	pub fn offset(&self) -> i32 {
		self.offset
	}

	/// Smallest bias that can be produced.
	pub fn min(&self) -> i32 {
		self.offset.wrapping_neg()
	}

	/// Largest bias that can be produced.
	pub fn max(&self) -> i32 {
		self.fold(self.range - 1)
	}

	fn fold(&self, value: u32) -> i32 {
		// `new` guarantees the result fits in `i32`.
		(i64::from(value % self.range) - i64::from(self.offset)) as i32
	}
}
impl Default for BiasBounds {
	fn default() -> Self {
		Self { range: Self::DEFAULT_RANGE, offset: Self::DEFAULT_OFFSET }
	}
}

/// Per-step bias callback handed to the downstream sampling loop.
///
/// The loop calls [`BiasSource::bias_for`] before every sampling step and adds the returned
/// integers to the raw scores of the listed candidates.
pub trait BiasSource
where
	Self: Send + Sync,
{
	/// Returns the bias for every candidate id.
	fn bias_for(&self, candidates: &[TokenId]) -> BiasMap;
}

/// Derives bias maps from signature tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BiasNudger {
	bounds: BiasBounds,
}
impl BiasNudger {
	/// Creates a nudger with the provided bounds.
	pub fn new(bounds: BiasBounds) -> Self {
		Self { bounds }
	}

	/// Configured bounds.
	pub fn bounds(&self) -> BiasBounds {
		self.bounds
	}

	/// Computes the bias for every candidate id under `signature`.
	pub fn bias_for<I>(&self, signature: &SignatureToken, candidates: I) -> BiasMap
	where
		I: IntoIterator<Item = TokenId>,
	{
		let bound = self.bind(signature);

		candidates.into_iter().map(|id| (id, bound.bias(id))).collect()
	}

	/// Binds the nudger to a signature so repeated lookups reuse the keyed state.
	pub fn bind(&self, signature: &SignatureToken) -> SignatureBias {
		SignatureBias {
			signature: *signature,
			deriver: KeyedDeriver::keyed(signature.as_bytes()),
			bounds: self.bounds,
		}
	}
}

/// A [`BiasNudger`] bound to one signature token.
#[derive(Clone, Debug)]
pub struct SignatureBias {
	signature: SignatureToken,
	deriver: KeyedDeriver,
	bounds: BiasBounds,
}
impl SignatureBias {
	/// Signature seeding this bias pattern.
	pub fn signature(&self) -> &SignatureToken {
		&self.signature
	}

	/// Bounds applied to every bias.
	pub fn bounds(&self) -> BiasBounds {
		self.bounds
	}

	/// Bias for a single token id.
	pub fn bias(&self, id: TokenId) -> i32 {
		let digest = self.deriver.derive(id.to_string().as_bytes());
		let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

		self.bounds.fold(value)
	}
}
impl BiasSource for SignatureBias {
	fn bias_for(&self, candidates: &[TokenId]) -> BiasMap {
		candidates.iter().map(|&id| (id, self.bias(id))).collect()
	}
}
