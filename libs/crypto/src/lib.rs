//! Cryptographic primitives used by the SBA consensus engine.

pub use fmt::*;

pub mod bls12_381;
mod fmt;
pub mod keccak256;
