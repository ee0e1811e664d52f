// self
use crate::{
	_prelude::*,
	detect::Tokenizer,
	gateway::{DetectionReport, DetectionRequest, Gateway, with_deadline},
	obs::{self, GatewayOp, OpOutcome, OpSpan},
	watermark::SignatureToken,
};

impl Gateway {
	/// Scores `request.text` against its claimed signature and looks up the provenance record.
	///
	/// Only a malformed signature is an error. A missing record, or a store that fails or times
	/// out during lookup, yields `record_found = false` with the score still reported.
	pub async fn detect<T>(
		&self,
		request: DetectionRequest,
		tokenizer: &T,
	) -> Result<DetectionReport>
	where
		T: ?Sized + Tokenizer,
	{
		const OP: GatewayOp = GatewayOp::Detect;

		let span = OpSpan::new(OP, "detect");

		obs::record_op_outcome(OP, OpOutcome::Attempt);

		let result = span
			.instrument(async move {
				let signature = SignatureToken::parse(&request.claimed_signature)?;
				let detection = self.detector.score(&request.text, &signature, tokenizer);
				let record = match with_deadline(
					"provenance lookup",
					self.timeouts.store(),
					self.store.lookup(&signature),
				)
				.await
				{
					Ok(record) => record,
					Err(e) => {
						obs::warn_op(OP, &e);

						None
					},
				};
				let signed_by = record.as_ref().and_then(|r| self.signer.verify(r)).cloned();

				Ok(DetectionReport {
					score: detection.score,
					watermarked: detection.is_watermarked(self.detector.threshold()),
					record_found: record.is_some(),
					detection,
					signed_by,
					record,
				})
			})
			.await;

		self.finish(OP, &result);

		result
	}
}
