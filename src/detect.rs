//! Watermark detection from text and a claimed signature.
//!
//! Detection replays the bias pattern seeded by the claimed signature over the whole
//! vocabulary and asks where the observed tokens sit inside that distribution. Text written
//! under the matching bias drifts toward high-bias ids, so the mean mid-rank of its tokens
//! rises above one half.
//!
//! For a token with bias `b`, its mid-rank is
//! `u = (#{ids with bias < b} + #{ids with bias = b} / 2) / V`. Under the null hypothesis
//! (text unrelated to the signature) `E[u] = 1/2` and `Var[u] = (1 - Σ p³) / 12`, where `p`
//! ranges over the share of the vocabulary holding each bias value. The score is the normal
//! CDF of `z = (Σ u - n/2) / sqrt(n · Var[u])`.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	watermark::{BiasNudger, SignatureBias, SignatureToken, TokenId},
};

/// Splits text into the downstream model's token ids.
pub trait Tokenizer
where
	Self: Send + Sync,
{
	/// Tokenizes `text`.
	fn tokenize(&self, text: &str) -> Vec<TokenId>;
}
impl<F> Tokenizer for F
where
	F: Fn(&str) -> Vec<TokenId> + Send + Sync,
{
	fn tokenize(&self, text: &str) -> Vec<TokenId> {
		self(text)
	}
}

/// Outcome of scoring one text against one signature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
	/// Likelihood in `[0, 1]` that the text carries the watermark.
	pub score: f64,
	/// Standardized mean mid-rank; `0.0` when nothing could be scored.
	pub z_score: f64,
	/// Number of tokens that contributed.
	pub tokens_scored: usize,
	/// Mean mid-rank of the scored tokens; `0.5` when nothing could be scored.
	pub mean_rank: f64,
}
impl Detection {
	/// Result for inputs that carry no evidence either way.
	pub const INCONCLUSIVE: Self =
		Self { score: 0.5, z_score: 0.0, tokens_scored: 0, mean_rank: 0.5 };

	/// Returns `true` when the score reaches `threshold`.
	pub fn is_watermarked(&self, threshold: f64) -> bool {
		self.score >= threshold
	}
}

/// Scores texts against claimed signatures.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detector {
	nudger: BiasNudger,
	vocabulary_size: u32,
	threshold: f64,
}
impl Detector {
	/// Default vocabulary size (GPT-2 byte-pair vocabulary).
	pub const DEFAULT_VOCABULARY_SIZE: u32 = 50_257;
	/// Default decision threshold.
	pub const DEFAULT_THRESHOLD: f64 = 0.99;

	/// Validates detection settings.
	pub fn new(
		nudger: BiasNudger,
		vocabulary_size: u32,
		threshold: f64,
	) -> Result<Self, ConfigError> {
		if vocabulary_size == 0 {
			return Err(ConfigError::EmptyVocabulary);
		}
		if !(0.0..=1.0).contains(&threshold) {
			return Err(ConfigError::InvalidThreshold { value: threshold });
		}

		Ok(Self { nudger, vocabulary_size, threshold })
	}

	/// Nudger whose bias pattern is replayed.
	pub fn nudger(&self) -> &BiasNudger {
		&self.nudger
	}

	/// Number of ids in the model vocabulary.
	pub fn vocabulary_size(&self) -> u32 {
		self.vocabulary_size
	}

	/// Score at or above which text is reported as watermarked.
	pub fn threshold(&self) -> f64 {
		self.threshold
	}

	/// Tokenizes `text` and scores it against `signature`.
	pub fn score<T>(&self, text: &str, signature: &SignatureToken, tokenizer: &T) -> Detection
	where
		T: ?Sized + Tokenizer,
	{
		self.score_tokens(&tokenizer.tokenize(text), signature)
	}

	/// Scores an already tokenized text against `signature`.
	///
	/// Ids outside the vocabulary are still scored against the vocabulary distribution.
	pub fn score_tokens(&self, token_ids: &[TokenId], signature: &SignatureToken) -> Detection {
		if token_ids.is_empty() {
			return Detection::INCONCLUSIVE;
		}

		let bound = self.nudger.bind(signature);
		let ranks = RankTable::tally(&bound, self.vocabulary_size);

		if ranks.variance <= 0.0 {
			return Detection { tokens_scored: token_ids.len(), ..Detection::INCONCLUSIVE };
		}

		let n = token_ids.len() as f64;
		let rank_sum = token_ids.iter().map(|&id| ranks.mid_rank(bound.bias(id))).sum::<f64>();
		let z_score = (rank_sum - n / 2.0) / (n * ranks.variance).sqrt();

		Detection {
			score: normal_cdf(z_score).clamp(0.0, 1.0),
			z_score,
			tokens_scored: token_ids.len(),
			mean_rank: rank_sum / n,
		}
	}
}
impl Default for Detector {
	fn default() -> Self {
		Self {
			nudger: BiasNudger::default(),
			vocabulary_size: Self::DEFAULT_VOCABULARY_SIZE,
			threshold: Self::DEFAULT_THRESHOLD,
		}
	}
}

/// Mid-rank lookup for every bias value present in the vocabulary.
struct RankTable {
	mid_ranks: BTreeMap<i32, f64>,
	variance: f64,
}
impl RankTable {
	fn tally(bound: &SignatureBias, vocabulary_size: u32) -> Self {
		let mut histogram = BTreeMap::<i32, u64>::new();

		for id in 0..vocabulary_size {
			*histogram.entry(bound.bias(id)).or_default() += 1;
		}

		let total = f64::from(vocabulary_size);
		let mut below = 0_u64;
		let mut cubes = 0.0;
		let mut mid_ranks = BTreeMap::new();

		for (bias, count) in histogram {
			let count_f = count as f64;
			let share = count_f / total;

			mid_ranks.insert(bias, (below as f64 + count_f / 2.0) / total);
			cubes += share * share * share;
			below += count;
		}

		Self { mid_ranks, variance: (1.0 - cubes) / 12.0 }
	}

	fn mid_rank(&self, bias: i32) -> f64 {
		if let Some(rank) = self.mid_ranks.get(&bias) {
			return *rank;
		}

		// Bias values absent from the vocabulary sit between their neighbours.
		let below = self.mid_ranks.range(..bias).next_back().map(|(_, rank)| *rank);
		let above = self.mid_ranks.range(bias..).next().map(|(_, rank)| *rank);

		match (below, above) {
			(Some(low), Some(high)) => (low + high) / 2.0,
			(Some(_), None) => 1.0,
			(None, Some(_)) => 0.0,
			(None, None) => 0.5,
		}
	}
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(z: f64) -> f64 {
	0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Complementary error function with fractional error below `1.2e-7`.
fn erfc(x: f64) -> f64 {
	let z = x.abs();
	let t = 1.0 / (1.0 + 0.5 * z);
	let poly = -z * z - 1.265_512_23
		+ t * (1.000_023_68
			+ t * (0.374_091_96
				+ t * (0.096_784_18
					+ t * (-0.186_288_06
						+ t * (0.278_868_07
							+ t * (-1.135_203_98
								+ t * (1.488_515_87
									+ t * (-0.822_152_23 + t * 0.170_872_77))))))));
	let ans = t * poly.exp();

	if x >= 0.0 { ans } else { 2.0 - ans }
}
