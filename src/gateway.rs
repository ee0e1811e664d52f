//! Request orchestration: admission, signing, generation, provenance, and detection.
//!
//! Every accepted request follows the same path: validate the input, admit it against the
//! caller's quota, sign it, optionally run the model with the signature-seeded bias, and
//! persist the provenance record. The signature is only returned once the record is durable,
//! so a request cancelled or failed before that point never leaves an unrecorded signature
//! in circulation.

mod detect;
mod generate;
mod issue;
mod metrics;

pub use metrics::GatewayMetrics;

// self
use crate::{
	_prelude::*,
	config::{GatewayConfig, Timeouts},
	detect::{Detection, Detector},
	error::InputError,
	id::{Identity, KeyId},
	obs::{self, GatewayOp, OpOutcome},
	rate_limit::{
		CounterStore, FixedWindowLimiter, RateLimitContext, RateLimitDecision, RateLimitPolicy,
	},
	store::{ProvenanceLocation, ProvenanceStore, StoreError},
	watermark::{
		ProvenanceRecord, SignatureBias, SignatureToken, TokenId, WatermarkSigner, normalize_prompt,
	},
};

/// Inbound generation or issuance request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
	/// Authenticated caller identity.
	pub identity: String,
	/// Raw prompt text.
	pub prompt: String,
}
impl GenerationRequest {
	/// Creates a request for `identity` carrying `prompt`.
	pub fn new(identity: impl Into<String>, prompt: impl Into<String>) -> Self {
		Self { identity: identity.into(), prompt: prompt.into() }
	}

	fn validate(self) -> Result<(Identity, String), InputError> {
		let identity = Identity::new(&self.identity)?;

		if normalize_prompt(&self.prompt).is_empty() {
			return Err(InputError::EmptyPrompt);
		}

		Ok((identity, self.prompt))
	}
}

/// Signature issued for an admitted request, together with its durable record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSignature {
	/// Signature token attached to the response.
	pub signature: SignatureToken,
	/// Where the provenance record was written.
	pub location: ProvenanceLocation,
	/// Persisted provenance record.
	pub record: ProvenanceRecord,
}

/// Watermarked completion returned by [`Gateway::generate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
	/// Completion text.
	pub text: String,
	/// Token ids the model emitted.
	pub token_ids: Vec<TokenId>,
	/// Signature seeding the watermark.
	pub signature: SignatureToken,
	/// Where the provenance record was written.
	pub location: ProvenanceLocation,
}

/// Candidate text paired with the signature it claims to carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRequest {
	/// Text to score.
	pub text: String,
	/// Encoded signature token supplied by the caller.
	pub claimed_signature: String,
}
impl DetectionRequest {
	/// Creates a detection request.
	pub fn new(text: impl Into<String>, claimed_signature: impl Into<String>) -> Self {
		Self { text: text.into(), claimed_signature: claimed_signature.into() }
	}
}

/// Detection outcome enriched with provenance information.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionReport {
	/// Watermark likelihood in `[0, 1]`.
	pub score: f64,
	/// Whether the score reaches the configured threshold.
	pub watermarked: bool,
	/// Whether a provenance record exists for the claimed signature.
	pub record_found: bool,
	/// Full statistical breakdown.
	pub detection: Detection,
	/// Ring key that minted the stored record, when it verifies.
	pub signed_by: Option<KeyId>,
	/// Stored provenance record, when found.
	pub record: Option<ProvenanceRecord>,
}

/// Provenance and rate-limited generation gateway.
#[derive(Clone)]
pub struct Gateway {
	signer: WatermarkSigner,
	limiter: Arc<dyn RateLimitPolicy>,
	store: Arc<dyn ProvenanceStore>,
	detector: Detector,
	timeouts: Timeouts,
	metrics: Arc<GatewayMetrics>,
}
impl Gateway {
	/// Builds a gateway from configuration, opening the configured counter and provenance
	/// backends.
	pub fn new(config: GatewayConfig) -> Result<Self> {
		let counters = config.counters.open()?;
		let store = config.storage.open()?;

		Ok(Self::with_backends(config, counters, store))
	}

	/// Builds a gateway over caller-supplied counter and provenance stores.
	pub fn with_backends(
		config: GatewayConfig,
		counters: Arc<dyn CounterStore>,
		store: Arc<dyn ProvenanceStore>,
	) -> Self {
		let signer = WatermarkSigner::new(&config.key_ring)
			.with_prompt_persistence(config.persist_prompt_text);
		let limiter = Arc::new(FixedWindowLimiter::new(counters, config.rate_limit));

		Self {
			signer,
			limiter,
			store,
			detector: config.detector,
			timeouts: config.timeouts,
			metrics: Default::default(),
		}
	}

	/// Replaces the admission policy.
	pub fn with_rate_limit_policy(mut self, policy: Arc<dyn RateLimitPolicy>) -> Self {
		self.limiter = policy;

		self
	}

	/// Signer used for new requests and record verification.
	pub fn signer(&self) -> &WatermarkSigner {
		&self.signer
	}

	/// Provenance store receiving every record.
	pub fn store(&self) -> &Arc<dyn ProvenanceStore> {
		&self.store
	}

	/// Detector used by [`Gateway::detect`].
	pub fn detector(&self) -> &Detector {
		&self.detector
	}

	/// Operation counters.
	pub fn metrics(&self) -> &GatewayMetrics {
		&self.metrics
	}

	/// Bias source for a signature, for sampling loops driven outside the gateway.
	pub fn bias_source(&self, signature: &SignatureToken) -> SignatureBias {
		self.detector.nudger().bind(signature)
	}

	async fn admit(&self, identity: &Identity, now: OffsetDateTime) -> Result<()> {
		let context = RateLimitContext::new(identity.clone()).with_observed_at(now);
		let decision = with_deadline(
			"rate limit counter",
			self.timeouts.counter(),
			self.limiter.evaluate(&context),
		)
		.await?;

		match decision {
			RateLimitDecision::Allow => Ok(()),
			RateLimitDecision::Deny(directive) => Err(Error::RateLimited(directive)),
		}
	}

	async fn append(&self, record: ProvenanceRecord) -> Result<ProvenanceLocation> {
		let location =
			with_deadline("provenance append", self.timeouts.store(), self.store.append(record))
				.await?;

		Ok(location)
	}

	fn finish<T>(&self, op: GatewayOp, result: &Result<T>) {
		let outcome = OpOutcome::of(result);

		obs::record_op_outcome(op, outcome);
		self.metrics.record(op, outcome);

		if let Err(e) = result {
			obs::warn_op(op, e);
		}
	}
}
impl Debug for Gateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("signer", &self.signer)
			.field("detector", &self.detector)
			.field("timeouts", &self.timeouts)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

async fn with_deadline<T, F>(
	operation: &'static str,
	deadline: Duration,
	fut: F,
) -> Result<T, StoreError>
where
	F: Future<Output = Result<T, StoreError>>,
{
	match tokio::time::timeout(deadline.unsigned_abs(), fut).await {
		Ok(result) => result,
		Err(_) => Err(StoreError::Timeout {
			operation: operation.into(),
			timeout_ms: deadline.whole_milliseconds().try_into().unwrap_or(u64::MAX),
		}),
	}
}
