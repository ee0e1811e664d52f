//! Watermark signing, provenance records, and per-token bias derivation.
//!
//! Every accepted request is signed with [`WatermarkSigner::sign`], producing a
//! [`SignatureToken`] and the [`ProvenanceRecord`] that anchors it. The token then seeds the
//! [`BiasNudger`], whose output is a pure function of `(signature, token id)` so detection can
//! replay it without the prompt, the caller identity, or the secret key.

pub mod bias;
pub mod prompt;
pub mod record;
pub mod signature;
pub mod signer;

pub use bias::*;
pub use prompt::*;
pub use record::*;
pub use signature::*;
pub use signer::*;
