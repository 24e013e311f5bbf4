//! Keys of the provisioner role.

mod aggregate_signature;
mod public_key;
mod secret_key;
mod signature;
mod testonly;

pub use aggregate_signature::AggregateSignature;
pub use public_key::PublicKey;
pub use sba_consensus_crypto::bls12_381::Error;
pub use secret_key::SecretKey;
pub use signature::Signature;
