//! HTTP object-store [`ProvenanceStore`] speaking plain `PUT`/`GET` against a bucket URL.
//!
//! Records land at `{base}/{prefix}/{signature}.json`. Writes send `If-None-Match: *` so the
//! object store itself refuses to overwrite an existing record, which keeps the trail
//! append-only even across gateway replicas.

// crates.io
use reqwest::{
	StatusCode,
	header::{CONTENT_TYPE, IF_NONE_MATCH},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	store::{ProvenanceLocation, ProvenanceStore, StoreError, StoreFuture, object_name},
	watermark::{ProvenanceRecord, SignatureToken},
};

/// Stores each provenance record as one JSON object behind an HTTP endpoint.
#[derive(Clone, Debug)]
pub struct ObjectProvenanceStore {
	client: ReqwestClient,
	base: Url,
	prefix: String,
}
impl ObjectProvenanceStore {
	/// Creates a store with a default reqwest client.
	pub fn new(base: Url, prefix: impl Into<String>) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Self::with_client(client, base, prefix)
	}

	/// Creates a store around a caller-supplied reqwest client.
	pub fn with_client(
		client: ReqwestClient,
		base: Url,
		prefix: impl Into<String>,
	) -> Result<Self, ConfigError> {
		if base.cannot_be_a_base() {
			return Err(ConfigError::InvalidObjectStoreUrl {
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			});
		}

		let prefix = prefix.into().trim_matches('/').to_owned();

		Ok(Self { client, base, prefix })
	}

	/// Bucket base URL.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// Key prefix applied to every object.
	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	/// URL of the object holding the record for `signature`.
	pub fn object_url(&self, signature: &SignatureToken) -> Url {
		let mut url = self.base.clone();

		// `with_client` rejects cannot-be-a-base URLs, so segments are always available.
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty();

			for part in self.prefix.split('/').filter(|part| !part.is_empty()) {
				segments.push(part);
			}

			segments.push(&object_name(signature));
		}

		url
	}

	async fn put(&self, record: ProvenanceRecord) -> Result<ProvenanceLocation, StoreError> {
		let url = self.object_url(&record.signature);
		let body = serde_json::to_vec(&record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize provenance record: {e}"),
		})?;
		let response = self
			.client
			.put(url.clone())
			.header(CONTENT_TYPE, "application/json")
			.header(IF_NONE_MATCH, "*")
			.body(body)
			.send()
			.await
			.map_err(|e| StoreError::Backend { message: format!("Failed to upload {url}: {e}") })?;
		let status = response.status();

		match status {
			s if s.is_success() => Ok(ProvenanceLocation::new(url.as_str())),
			StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT =>
				Err(StoreError::conflict(&record.signature)),
			s => Err(StoreError::Backend {
				message: format!("Object store rejected upload to {url} with status {s}"),
			}),
		}
	}

	async fn get(
		&self,
		signature: &SignatureToken,
	) -> Result<Option<ProvenanceRecord>, StoreError> {
		let url = self.object_url(signature);
		let response = self
			.client
			.get(url.clone())
			.send()
			.await
			.map_err(|e| StoreError::Backend { message: format!("Failed to fetch {url}: {e}") })?;
		let status = response.status();

		if status == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !status.is_success() {
			return Err(StoreError::Backend {
				message: format!("Object store rejected fetch of {url} with status {status}"),
			});
		}

		let bytes = response.bytes().await.map_err(|e| StoreError::Backend {
			message: format!("Failed to read body of {url}: {e}"),
		})?;
		let mut de = serde_json::Deserializer::from_slice(&bytes);
		let record: ProvenanceRecord =
			serde_path_to_error::deserialize(&mut de).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {url} at `{}`: {}", e.path(), e.inner()),
			})?;

		if record.signature != *signature {
			return Err(StoreError::Serialization {
				message: format!("Object {url} holds a record for signature {}", record.signature),
			});
		}

		Ok(Some(record))
	}
}
impl ProvenanceStore for ObjectProvenanceStore {
	fn append(&self, record: ProvenanceRecord) -> StoreFuture<'_, ProvenanceLocation> {
		Box::pin(self.put(record))
	}

	fn lookup<'a>(
		&'a self,
		signature: &'a SignatureToken,
	) -> StoreFuture<'a, Option<ProvenanceRecord>> {
		Box::pin(self.get(signature))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::crypto::DIGEST_LEN;

	fn store(base: &str, prefix: &str) -> ObjectProvenanceStore {
		ObjectProvenanceStore::with_client(
			ReqwestClient::new(),
			Url::parse(base).expect("Base URL fixture should parse."),
			prefix,
		)
		.expect("Object store fixture should build.")
	}

	#[test]
	fn object_urls_join_prefix_and_signature() {
		let signature = SignatureToken::from_bytes([0; DIGEST_LEN]);
		let expected = format!("https://bucket.example/records/watermarks/{}.json", "A".repeat(43));

		let trailing = store("https://bucket.example/records/", "/watermarks/");

		assert_eq!(trailing.object_url(&signature).as_str(), expected);
		assert_eq!(
			store("https://bucket.example/records", "watermarks").object_url(&signature).as_str(),
			expected
		);
	}

	#[test]
	fn nested_prefixes_are_split_into_segments() {
		let signature = SignatureToken::from_bytes([0; DIGEST_LEN]);
		let url = store("https://bucket.example", "prod/watermarks").object_url(&signature);

		assert!(url.as_str().starts_with("https://bucket.example/prod/watermarks/"));
	}

	#[test]
	fn cannot_be_a_base_urls_are_rejected() {
		let err = ObjectProvenanceStore::with_client(
			ReqwestClient::new(),
			Url::parse("mailto:ops@example.com").expect("Mailto fixture should parse."),
			"watermarks",
		)
		.expect_err("Mailto URLs cannot hold object paths.");

		assert!(matches!(err, ConfigError::InvalidObjectStoreUrl { .. }));
	}
}
