use super::{PublicKey, Signature};
use sba_consensus_crypto::{bls12_381, ByteFmt, Text, TextFmt};
use std::{fmt, sync::Arc};

/// Secret key of a provisioner.
/// Kept behind an `Arc` so that clones share one copy of the secret.
#[derive(Clone)]
pub struct SecretKey(pub(crate) Arc<bls12_381::SecretKey>);

impl SecretKey {
    /// Generates a fresh key from the OS entropy source.
    pub fn generate() -> Self {
        Self(Arc::new(bls12_381::SecretKey::generate()))
    }

    /// Public key of this secret key.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public())
    }

    /// Signs raw bytes. Callers pass the canonical signable encoding of a message.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg))
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.public() == other.public()
    }
}

impl ByteFmt for SecretKey {
    fn encode(&self) -> Vec<u8> {
        ByteFmt::encode(&*self.0)
    }

    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        ByteFmt::decode(bytes).map(Arc::new).map(Self)
    }
}

impl TextFmt for SecretKey {
    fn encode(&self) -> String {
        format!(
            "provisioner:secret:bls12_381:{}",
            hex::encode(ByteFmt::encode(&*self.0))
        )
    }

    fn decode(text: Text) -> anyhow::Result<Self> {
        text.strip("provisioner:secret:bls12_381:")?
            .decode_hex()
            .map(Arc::new)
            .map(Self)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        // Never print the secret itself.
        write!(fmt, "<secret for {:?}>", self.public())
    }
}
