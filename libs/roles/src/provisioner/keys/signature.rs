use super::{Error, PublicKey};
use sba_consensus_crypto::{bls12_381, ByteFmt, Text, TextFmt};
use std::fmt;

/// Signature of a single provisioner.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(pub(crate) bls12_381::Signature);

impl Signature {
    /// Verifies the signature of `msg` against `pk`.
    pub fn verify(&self, msg: &[u8], pk: &PublicKey) -> Result<(), Error> {
        self.0.verify(msg, &pk.0)
    }
}

impl ByteFmt for Signature {
    fn encode(&self) -> Vec<u8> {
        ByteFmt::encode(&self.0)
    }
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        ByteFmt::decode(bytes).map(Self)
    }
}

impl TextFmt for Signature {
    fn encode(&self) -> String {
        format!(
            "provisioner:signature:bls12_381:{}",
            hex::encode(ByteFmt::encode(&self.0))
        )
    }
    fn decode(text: Text) -> anyhow::Result<Self> {
        text.strip("provisioner:signature:bls12_381:")?
            .decode_hex()
            .map(Self)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&TextFmt::encode(self))
    }
}
