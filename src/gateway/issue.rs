// self
use crate::{
	_prelude::*,
	gateway::{Gateway, GenerationRequest, IssuedSignature},
	obs::{self, GatewayOp, OpOutcome, OpSpan},
};

impl Gateway {
	/// Admits, signs, and records a request without calling a model.
	///
	/// Use this when the sampling loop runs elsewhere and only needs the signature; feed it
	/// [`Gateway::bias_source`] for the returned token.
	pub async fn issue(&self, request: GenerationRequest) -> Result<IssuedSignature> {
		self.issue_at(request, OffsetDateTime::now_utc()).await
	}

	/// Same as [`Gateway::issue`] with an explicit clock reading.
	pub async fn issue_at(
		&self,
		request: GenerationRequest,
		now: OffsetDateTime,
	) -> Result<IssuedSignature> {
		const OP: GatewayOp = GatewayOp::Issue;

		let span = OpSpan::new(OP, "issue");

		obs::record_op_outcome(OP, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let (identity, prompt) = request.validate()?;

				self.admit(&identity, now).await?;

				let (signature, record) = self.signer.sign(&prompt, &identity, now)?;
				let location = self.append(record.clone()).await?;

				Ok(IssuedSignature { signature, location, record })
			})
			.await;

		self.finish(OP, &result);

		result
	}
}
