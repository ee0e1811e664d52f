// self
use crate::{
	_prelude::*,
	gateway::{Gateway, Generation, GenerationRequest},
	model::GenerationModel,
	obs::{self, GatewayOp, OpOutcome, OpSpan},
};

impl Gateway {
	/// Runs a watermarked generation for an admitted request.
	///
	/// The model receives a bias source bound to the request's signature. Its output is only
	/// returned after the provenance record is durable; a failed or timed-out append discards
	/// the completion and fails the request.
	pub async fn generate<M>(&self, model: &M, request: GenerationRequest) -> Result<Generation>
	where
		M: ?Sized + GenerationModel,
	{
		self.generate_at(model, request, OffsetDateTime::now_utc()).await
	}

	/// Same as [`Gateway::generate`] with an explicit clock reading.
	pub async fn generate_at<M>(
		&self,
		model: &M,
		request: GenerationRequest,
		now: OffsetDateTime,
	) -> Result<Generation>
	where
		M: ?Sized + GenerationModel,
	{
		const OP: GatewayOp = GatewayOp::Generate;

		let span = OpSpan::new(OP, "generate");

		obs::record_op_outcome(OP, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let (identity, prompt) = request.validate()?;

				self.admit(&identity, now).await?;

				let (signature, record) = self.signer.sign(&prompt, &identity, now)?;
				let bias = self.bias_source(&signature);
				let output = model.generate(&prompt, &bias).await?;
				let location = self.append(record).await?;

				Ok(Generation {
					text: output.text,
					token_ids: output.token_ids,
					signature,
					location,
				})
			})
			.await;

		self.finish(OP, &result);

		result
	}
}
