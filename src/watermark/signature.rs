//! Signature token type and its URL-safe textual form.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	crypto::{DIGEST_LEN, Digest},
	error::InputError,
};

/// Keyed digest identifying one generation request and seeding its bias pattern.
///
/// The textual form is URL-safe base64 without padding. Parsing tolerates trailing `=`
/// padding so tokens produced by padded encoders still verify.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignatureToken(Digest);
impl SignatureToken {
	/// Length of the encoded form in characters.
	pub const ENCODED_LEN: usize = 43;

	/// Wraps raw digest bytes.
	pub fn from_bytes(bytes: Digest) -> Self {
		Self(bytes)
	}

	/// Decodes a token from its textual form.
	pub fn parse(value: &str) -> Result<Self, InputError> {
		let trimmed = value.trim().trim_end_matches('=');
		let decoded = URL_SAFE_NO_PAD
			.decode(trimmed)
			.map_err(|e| InputError::MalformedSignature { reason: e.to_string() })?;
		let bytes: Digest =
			decoded.as_slice().try_into().map_err(|_| InputError::MalformedSignature {
				reason: format!("expected {DIGEST_LEN} bytes, found {}", decoded.len()),
			})?;

		Ok(Self(bytes))
	}

	/// Raw seed bytes.
	pub fn as_bytes(&self) -> &Digest {
		&self.0
	}

	/// URL-safe, unpadded base64 rendering.
	pub fn encode(&self) -> String {
		URL_SAFE_NO_PAD.encode(self.0)
	}
}
impl Debug for SignatureToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SignatureToken({})", self.encode())
	}
}
impl Display for SignatureToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.encode())
	}
}
impl FromStr for SignatureToken {
	type Err = InputError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl From<SignatureToken> for String {
	fn from(value: SignatureToken) -> Self {
		value.encode()
	}
}
impl TryFrom<String> for SignatureToken {
	type Error = InputError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
