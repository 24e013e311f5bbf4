use super::{Error, PublicKey, Signature};
use sba_consensus_crypto::{bls12_381, ByteFmt, Text, TextFmt};
use std::fmt;

/// Signatures of a committee subset over one message, folded into one.
#[derive(Clone, PartialEq, Eq)]
pub struct AggregateSignature(pub(crate) bls12_381::AggregateSignature);

impl AggregateSignature {
    /// Aggregates a non-empty set of signatures.
    pub fn aggregate<'a>(sigs: impl IntoIterator<Item = &'a Signature>) -> Result<Self, Error> {
        bls12_381::AggregateSignature::aggregate(sigs.into_iter().map(|s| &s.0)).map(Self)
    }

    /// Folds `sig` into the aggregate.
    pub fn add(&mut self, sig: &Signature) -> Result<(), Error> {
        self.0.add(&sig.0)
    }

    /// Verifies that every key in `keys` signed `msg`.
    pub fn verify<'a>(
        &self,
        msg: &[u8],
        keys: impl IntoIterator<Item = &'a PublicKey>,
    ) -> Result<(), Error> {
        let agg_pk = bls12_381::AggregatePublicKey::aggregate(keys.into_iter().map(|k| &k.0))?;
        self.0.verify(msg, &agg_pk)
    }
}

impl ByteFmt for AggregateSignature {
    fn encode(&self) -> Vec<u8> {
        ByteFmt::encode(&self.0)
    }
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        ByteFmt::decode(bytes).map(Self)
    }
}

impl TextFmt for AggregateSignature {
    fn encode(&self) -> String {
        format!(
            "provisioner:aggregate_signature:bls12_381:{}",
            hex::encode(ByteFmt::encode(&self.0))
        )
    }
    fn decode(text: Text) -> anyhow::Result<Self> {
        text.strip("provisioner:aggregate_signature:bls12_381:")?
            .decode_hex()
            .map(Self)
    }
}

impl fmt::Debug for AggregateSignature {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&TextFmt::encode(self))
    }
}
