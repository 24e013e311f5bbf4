//! BLS signatures over BLS12-381, public keys in G1 and signatures in G2.
//! A thin adapter over `blst` which exposes exactly what committee voting needs:
//! signing a vote, aggregating the votes of a committee subset and
//! checking the aggregate against the subset's aggregate public key.
//!
//! Rogue key attacks are out of scope here: provisioner keys are registered
//! together with their stake, which is where possession has to be proven.

use crate::ByteFmt;
use anyhow::{anyhow, bail};
use blst::{min_pk as bls, BLST_ERROR};
use rand::Rng as _;
use zeroize::ZeroizeOnDrop;

#[cfg(test)]
mod tests;

pub mod testonly;

/// Domain separation tag of consensus vote signatures.
pub const DST: &[u8] = b"SBA_CONSENSUS_BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Length of a compressed public key.
pub const PUBLIC_KEY_BYTES_LEN: usize = 48;

/// Length of a compressed signature.
pub const SIGNATURE_BYTES_LEN: usize = 96;

/// Compressed encoding of the public key at infinity.
pub const INFINITY_PUBLIC_KEY: [u8; PUBLIC_KEY_BYTES_LEN] = {
    let mut raw = [0; PUBLIC_KEY_BYTES_LEN];
    raw[0] = 0xc0;
    raw
};

/// Secret half of a provisioner key pair.
#[derive(ZeroizeOnDrop)]
pub struct SecretKey(bls::SecretKey);

impl SecretKey {
    /// Generates a key from the OS entropy source.
    pub fn generate() -> Self {
        Self::derive(&rand::rngs::OsRng.gen::<[u8; 32]>())
    }

    /// Derives a key from 32 bytes of key material.
    pub(crate) fn derive(ikm: &[u8; 32]) -> Self {
        // key_gen only fails for less than 32 bytes of key material.
        Self(bls::SecretKey::key_gen_v4_5(ikm, &[], &[]).unwrap())
    }

    /// Signs `msg`.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg, DST, &[]))
    }

    /// Public key matching this secret key.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk())
    }
}

impl ByteFmt for SecretKey {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        bls::SecretKey::from_bytes(bytes)
            .map(Self)
            .map_err(|err| anyhow!("failed to decode secret key: {err:?}"))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }
}

/// Public key of a provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(bls::PublicKey);

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(&self.0.compress());
    }
}

impl ByteFmt for PublicKey {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes == INFINITY_PUBLIC_KEY {
            bail!(Error::InfinityPublicKey)
        }
        bls::PublicKey::uncompress(bytes)
            .map(Self)
            .map_err(|err| anyhow!("failed to decode public key: {err:?}"))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.compress().to_vec()
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.compress().cmp(&other.0.compress())
    }
}

/// Signature of a single provisioner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(bls::Signature);

impl Signature {
    /// Verifies the signature of `msg` against `pk`.
    pub fn verify(&self, msg: &[u8], pk: &PublicKey) -> Result<(), Error> {
        match self.0.verify(true, msg, DST, &[], &pk.0, true) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            err => Err(Error::SignatureVerification(err)),
        }
    }
}

impl ByteFmt for Signature {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        bls::Signature::uncompress(bytes)
            .map(Self)
            .map_err(|err| anyhow!("failed to decode signature: {err:?}"))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.compress().to_vec()
    }
}

/// Aggregate of public keys, the verification key of an aggregate signature
/// produced by the same subset of signers over the same message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatePublicKey(bls::PublicKey);

impl AggregatePublicKey {
    /// Aggregates `pks`. Fails on an empty set of keys.
    pub fn aggregate<'a>(pks: impl IntoIterator<Item = &'a PublicKey>) -> Result<Self, Error> {
        let pks: Vec<&bls::PublicKey> = pks.into_iter().map(|pk| &pk.0).collect();
        bls::AggregatePublicKey::aggregate(&pks, false)
            .map(|agg| Self(agg.to_public_key()))
            .map_err(Error::KeyAggregation)
    }
}

/// Signature aggregated over a single message by a subset of signers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateSignature(bls::Signature);

impl AggregateSignature {
    /// Aggregates `sigs`. Fails on an empty set of signatures.
    pub fn aggregate<'a>(sigs: impl IntoIterator<Item = &'a Signature>) -> Result<Self, Error> {
        let sigs: Vec<&bls::Signature> = sigs.into_iter().map(|s| &s.0).collect();
        bls::AggregateSignature::aggregate(&sigs, false)
            .map(|agg| Self(agg.to_signature()))
            .map_err(Error::SignatureAggregation)
    }

    /// Folds another signature into the aggregate.
    pub fn add(&mut self, sig: &Signature) -> Result<(), Error> {
        let mut agg = bls::AggregateSignature::from_signature(&self.0);
        agg.add_signature(&sig.0, false)
            .map_err(Error::SignatureAggregation)?;
        self.0 = agg.to_signature();
        Ok(())
    }

    /// Verifies that every signer behind `agg_pk` signed `msg`.
    pub fn verify(&self, msg: &[u8], agg_pk: &AggregatePublicKey) -> Result<(), Error> {
        match self.0.verify(true, msg, DST, &[], &agg_pk.0, false) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            err => Err(Error::AggregateSignatureVerification(err)),
        }
    }
}

impl ByteFmt for AggregateSignature {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        bls::Signature::uncompress(bytes)
            .map(Self)
            .map_err(|err| anyhow!("failed to decode aggregate signature: {err:?}"))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.compress().to_vec()
    }
}

/// Failures of BLS operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The public key is the point at infinity.
    #[error("public key at infinity")]
    InfinityPublicKey,
    /// Public keys could not be aggregated.
    #[error("aggregating public keys: {0:?}")]
    KeyAggregation(BLST_ERROR),
    /// Signatures could not be aggregated.
    #[error("aggregating signatures: {0:?}")]
    SignatureAggregation(BLST_ERROR),
    /// Signature doesn't match the message and key.
    #[error("signature verification: {0:?}")]
    SignatureVerification(BLST_ERROR),
    /// Aggregate signature doesn't match the message and aggregate key.
    #[error("aggregate signature verification: {0:?}")]
    AggregateSignatureVerification(BLST_ERROR),
}
