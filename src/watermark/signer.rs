//! Watermark signer: turns an admitted request into a signature and provenance record.

// self
use crate::{
	_prelude::*,
	crypto::{KeyRing, KeyedDeriver},
	error::InputError,
	id::{Identity, KeyId},
	watermark::{
		AlgorithmVersion, PromptDigest, ProvenanceRecord, SignatureToken, normalize_prompt,
	},
};

/// Signs normalized prompts with the active key and verifies records against the whole ring.
#[derive(Clone, Debug)]
pub struct WatermarkSigner {
	active_id: KeyId,
	active: KeyedDeriver,
	derivers: Vec<(KeyId, KeyedDeriver)>,
	persist_prompt_text: bool,
}
impl WatermarkSigner {
	/// Builds a signer from the configured key ring.
	pub fn new(keys: &KeyRing) -> Self {
		let derivers = keys.iter().map(|(id, key)| (id.clone(), KeyedDeriver::new(key))).collect();

		Self {
			active_id: keys.active_id().clone(),
			active: KeyedDeriver::new(keys.active()),
			derivers,
			persist_prompt_text: false,
		}
	}

	/// Copies the raw prompt into every record for audit.
	pub fn with_prompt_persistence(mut self, enabled: bool) -> Self {
		self.persist_prompt_text = enabled;

		self
	}

	/// Identifier of the key used for new signatures.
	pub fn active_key_id(&self) -> &KeyId {
		&self.active_id
	}

	/// Derives the signature token and provenance record for one request.
	///
	/// Pure over its inputs: identical `(key, prompt, identity, now)` always yield an identical
	/// token. Only an empty (post-normalization) prompt is rejected.
	pub fn sign(
		&self,
		prompt_text: &str,
		identity: &Identity,
		now: OffsetDateTime,
	) -> Result<(SignatureToken, ProvenanceRecord), InputError> {
		let normalized = normalize_prompt(prompt_text);

		if normalized.is_empty() {
			return Err(InputError::EmptyPrompt);
		}

		let prompt_hash = PromptDigest::of_normalized(&normalized);
		let timestamp_unix = now.unix_timestamp();
		let message = signing_message(&prompt_hash, identity, timestamp_unix);
		let signature = SignatureToken::from_bytes(self.active.derive(&message));
		let record = ProvenanceRecord {
			prompt_hash,
			user_id: identity.clone(),
			timestamp_unix,
			signature,
			algo_version: AlgorithmVersion::CURRENT,
			prompt_text: self.persist_prompt_text.then(|| prompt_text.to_owned()),
		};

		Ok((signature, record))
	}

	/// Returns the id of the ring key that minted `record`, if any.
	pub fn verify(&self, record: &ProvenanceRecord) -> Option<&KeyId> {
		match record.algo_version {
			AlgorithmVersion::HmacSha256V1 => {
				let message =
					signing_message(&record.prompt_hash, &record.user_id, record.timestamp_unix);

				self.derivers
					.iter()
					.find(|(_, deriver)| deriver.verify(&message, record.signature.as_bytes()))
					.map(|(id, _)| id)
			},
		}
	}
}

fn signing_message(
	prompt_hash: &PromptDigest,
	identity: &Identity,
	timestamp_unix: i64,
) -> Vec<u8> {
	format!("{}|{identity}|{timestamp_unix}", prompt_hash.to_hex()).into_bytes()
}
