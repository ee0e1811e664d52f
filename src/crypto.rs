//! Keyed derivation primitives and secret key handling.

pub mod deriver;
pub mod secret;

pub use deriver::*;
pub use secret::*;
