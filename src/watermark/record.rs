//! Immutable provenance records and algorithm version tags.

// self
use crate::{
	_prelude::*,
	id::Identity,
	watermark::{PromptDigest, SignatureToken},
};

/// Derivation scheme used to mint a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmVersion {
	/// HMAC-SHA256 over `hex(sha256(normalized prompt)) | identity | unix seconds`.
	#[serde(rename = "HMAC-SHA256-v1")]
	HmacSha256V1,
}
impl AlgorithmVersion {
	/// Scheme used for newly issued signatures.
	pub const CURRENT: Self = Self::HmacSha256V1;

	/// Returns the stable tag persisted in records.
	pub const fn as_str(self) -> &'static str {
		match self {
			AlgorithmVersion::HmacSha256V1 => "HMAC-SHA256-v1",
		}
	}
}
impl Display for AlgorithmVersion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Durable audit entry linking a signature to its originating request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceRecord {
	/// Digest of the normalized prompt.
	pub prompt_hash: PromptDigest,
	/// Caller identity the request was admitted for.
	pub user_id: Identity,
	/// Signing instant in Unix seconds.
	pub timestamp_unix: i64,
	/// Issued signature token.
	pub signature: SignatureToken,
	/// Derivation scheme tag.
	pub algo_version: AlgorithmVersion,
	/// Raw prompt text, only present when prompt persistence is enabled.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prompt_text: Option<String>,
}
impl ProvenanceRecord {
	/// Signing instant as a UTC timestamp, if representable.
	pub fn signed_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.timestamp_unix).ok()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::crypto::DIGEST_LEN;

	fn record(prompt_text: Option<&str>) -> ProvenanceRecord {
		ProvenanceRecord {
			prompt_hash: PromptDigest::of_prompt("hello"),
			user_id: Identity::new("alice").expect("Identity fixture should be valid."),
			timestamp_unix: 1000,
			signature: SignatureToken::from_bytes([1; DIGEST_LEN]),
			algo_version: AlgorithmVersion::CURRENT,
			prompt_text: prompt_text.map(str::to_owned),
		}
	}

	#[test]
	fn json_uses_persisted_field_names() {
		let value = serde_json::to_value(record(None)).expect("Record should serialize to JSON.");
		let object = value.as_object().expect("Record should serialize as a JSON object.");
		let mut keys = object.keys().map(String::as_str).collect::<Vec<_>>();

		keys.sort_unstable();

		assert_eq!(keys, ["algoVersion", "promptHash", "signature", "timestampUnix", "userId"]);
		assert_eq!(object["algoVersion"], "HMAC-SHA256-v1");
		assert_eq!(object["timestampUnix"], 1000);
		assert_eq!(
			object["promptHash"],
			"2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
		);
	}

	#[test]
	fn prompt_text_is_optional_on_read() {
		let with_prompt = record(Some("hello"));
		let payload = serde_json::to_string(&with_prompt).expect("Record should serialize.");

		assert!(payload.contains("\"promptText\":\"hello\""));

		let parsed: ProvenanceRecord =
			serde_json::from_str(&payload).expect("Record should deserialize.");

		assert_eq!(parsed, with_prompt);
		assert_eq!(parsed.signed_at().map(OffsetDateTime::unix_timestamp), Some(1000));
	}

	#[test]
	fn unknown_algorithm_versions_are_rejected() {
		let payload = serde_json::to_string(&record(None))
			.expect("Record should serialize.")
			.replace("HMAC-SHA256-v1", "HMAC-SHA256-v9");

		assert!(serde_json::from_str::<ProvenanceRecord>(&payload).is_err());
	}
}
