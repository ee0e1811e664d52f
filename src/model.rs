//! Seam to the downstream generation model.
//!
//! The gateway never samples tokens itself. It hands the model a [`BiasSource`] bound to the
//! request's signature, and the model's sampling loop adds those biases to its raw scores
//! before every step.

// self
use crate::{
	_prelude::*,
	error::DownstreamError,
	watermark::{BiasSource, TokenId},
};

/// Boxed future returned by [`GenerationModel::generate`].
pub type ModelFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ModelOutput, DownstreamError>> + 'a + Send>>;

/// Text generator that accepts a per-step bias callback.
pub trait GenerationModel
where
	Self: Send + Sync,
{
	/// Generates a completion for `prompt`, consulting `bias` before each sampling step.
	fn generate<'a>(&'a self, prompt: &'a str, bias: &'a dyn BiasSource) -> ModelFuture<'a>;
}

/// Completion returned by a [`GenerationModel`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
	/// Decoded completion text.
	pub text: String,
	/// Token ids the model emitted, in order.
	pub token_ids: Vec<TokenId>,
}
impl ModelOutput {
	/// Creates an output from decoded text and its token ids.
	pub fn new(text: impl Into<String>, token_ids: Vec<TokenId>) -> Self {
		Self { text: text.into(), token_ids }
	}
}
