//! Prompt normalization and digesting.
//!
//! Normalization is part of the signing contract: any change here changes every
//! [`PromptDigest`] and therefore needs a new algorithm version.

// std
use std::borrow::Cow;
// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, crypto::DIGEST_LEN};

/// Applies the v1 normalization policy to prompt text.
///
/// CRLF and lone CR line endings become LF, and leading/trailing Unicode whitespace is
/// trimmed. Case, interior whitespace, and Unicode composition are left untouched.
pub fn normalize_prompt(text: &str) -> Cow<'_, str> {
	let trimmed = text.trim();

	if trimmed.contains('\r') {
		Cow::Owned(trimmed.replace("\r\n", "\n").replace('\r', "\n"))
	} else {
		Cow::Borrowed(trimmed)
	}
}

/// SHA-256 digest of a normalized prompt, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptDigest([u8; DIGEST_LEN]);
impl PromptDigest {
	/// Digests already-normalized prompt text.
	pub fn of_normalized(normalized: &str) -> Self {
		Self(Sha256::digest(normalized.as_bytes()).into())
	}

	/// Normalizes and digests raw prompt text.
	pub fn of_prompt(text: &str) -> Self {
		Self::of_normalized(&normalize_prompt(text))
	}

	/// Parses a 64-character hex digest.
	pub fn from_hex(value: &str) -> Result<Self, hex::FromHexError> {
		let mut bytes = [0_u8; DIGEST_LEN];

		hex::decode_to_slice(value, &mut bytes)?;

		Ok(Self(bytes))
	}

	/// Lowercase hex rendering used in records and signing messages.
	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	/// Raw digest bytes.
	pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
		&self.0
	}
}
impl Debug for PromptDigest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "PromptDigest({})", self.to_hex())
	}
}
impl Display for PromptDigest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_hex())
	}
}
impl From<PromptDigest> for String {
	fn from(value: PromptDigest) -> Self {
		value.to_hex()
	}
}
impl TryFrom<String> for PromptDigest {
	type Error = hex::FromHexError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::from_hex(&value)
	}
}
