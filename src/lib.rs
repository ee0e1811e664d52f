//! Rate-limited generation gateway that signs every request, watermarks model output through
//! keyed token biases, and keeps an append-only provenance trail so text can later be traced
//! back to the request that produced it.
//!
//! The request path is [`gateway::Gateway::generate`]: admission against a per-identity
//! fixed-window quota, an HMAC-SHA256 signature over the normalized prompt, a bias source
//! seeded by that signature for the downstream sampling loop, and a durable
//! [`watermark::ProvenanceRecord`]. [`gateway::Gateway::detect`] replays the bias pattern
//! for a claimed signature and scores candidate text against it.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod crypto;
pub mod detect;
pub mod error;
pub mod gateway;
pub mod id;
pub mod model;
pub mod obs;
pub mod rate_limit;
pub mod store;
pub mod watermark;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// crates.io
	use rand::{Rng, SeedableRng, rngs::StdRng};
	// self
	use crate::{
		config::GatewayConfig,
		crypto::{KeyRing, SecretKey},
		gateway::Gateway,
		id::KeyId,
		model::{GenerationModel, ModelFuture, ModelOutput},
		rate_limit::MemoryCounterStore,
		store::MemoryProvenanceStore,
		watermark::{BiasSource, TokenId},
	};

	/// Secret used by every test gateway.
	pub const TEST_SECRET: &str = "k1";
	/// Vocabulary size used by test gateways; small enough to keep detection fast.
	pub const TEST_VOCABULARY_SIZE: u32 = 2_000;

	/// Builds a configuration around the `k1` test key and the provided quota.
	pub fn test_gateway_config(limit_per_window: u32) -> GatewayConfig {
		let key_ring = KeyRing::new(
			KeyId::new("primary").expect("Test key id should be valid."),
			SecretKey::new(TEST_SECRET).expect("Test secret should be non-empty."),
		);

		GatewayConfig::builder()
			.key_ring(key_ring)
			.rate_limit(limit_per_window, Duration::seconds(60), Duration::seconds(10))
			.vocabulary_size(TEST_VOCABULARY_SIZE)
			.build()
			.expect("Test gateway configuration should be valid.")
	}

	/// Constructs a [`Gateway`] backed by in-memory counter and provenance stores.
	pub fn build_test_gateway(limit_per_window: u32) -> (Gateway, Arc<MemoryProvenanceStore>) {
		let store = Arc::new(MemoryProvenanceStore::default());
		let gateway = Gateway::with_backends(
			test_gateway_config(limit_per_window),
			Arc::new(MemoryCounterStore::default()),
			store.clone(),
		);

		(gateway, store)
	}

	/// Seeded stand-in for a language model's sampling loop.
	///
	/// Each step draws a handful of candidate ids with random raw scores, adds the gateway's
	/// bias, and keeps the best candidate. Output text is the ids rendered as `t{id}` words so
	/// [`tokenize_test_text`] can recover them.
	#[derive(Clone, Debug)]
	pub struct SimulatedModel {
		/// Number of tokens emitted per generation.
		pub length: usize,
		/// Candidates considered per step.
		pub candidates: usize,
		/// RNG seed.
		pub seed: u64,
	}
	impl SimulatedModel {
		/// Creates a model emitting `length` tokens.
		pub fn new(length: usize, seed: u64) -> Self {
			Self { length, candidates: 8, seed }
		}

		/// Runs the sampling loop synchronously.
		pub fn sample(&self, bias: &dyn BiasSource) -> Vec<TokenId> {
			let mut rng = StdRng::seed_from_u64(self.seed);
			let mut token_ids = Vec::with_capacity(self.length);

			for _ in 0..self.length {
				let candidates = (0..self.candidates)
					.map(|_| rng.random_range(0..TEST_VOCABULARY_SIZE))
					.collect::<Vec<_>>();
				let raw = candidates.iter().map(|_| rng.random::<f64>() * 8.0).collect::<Vec<_>>();
				let biases = bias.bias_for(&candidates);
				let pick = candidates
					.iter()
					.zip(raw)
					.map(|(id, score)| (*id, score + f64::from(biases[id])))
					.max_by(|a, b| a.1.total_cmp(&b.1))
					.map(|(id, _)| id)
					.expect("Sampling step should have at least one candidate.");

				token_ids.push(pick);
			}

			token_ids
		}
	}
	impl GenerationModel for SimulatedModel {
		fn generate<'a>(&'a self, _prompt: &'a str, bias: &'a dyn BiasSource) -> ModelFuture<'a> {
			Box::pin(async move {
				let token_ids = self.sample(bias);

				Ok(ModelOutput::new(render_test_tokens(&token_ids), token_ids))
			})
		}
	}

	/// Renders ids as whitespace-separated `t{id}` words.
	pub fn render_test_tokens(token_ids: &[TokenId]) -> String {
		token_ids.iter().map(|id| format!("t{id}")).collect::<Vec<_>>().join(" ")
	}

	/// Tokenizer matching [`render_test_tokens`]; unknown words are skipped.
	pub fn tokenize_test_text(text: &str) -> Vec<TokenId> {
		text.split_whitespace().filter_map(|word| word.strip_prefix('t')?.parse().ok()).collect()
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
#[cfg(not(feature = "reqwest"))] use serde_path_to_error as _;
