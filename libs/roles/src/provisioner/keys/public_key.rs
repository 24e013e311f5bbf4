use sba_consensus_crypto::{bls12_381, ByteFmt, Text, TextFmt};
use std::fmt;

/// Public key of a provisioner, which is also its identity in committees.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(pub(crate) bls12_381::PublicKey);

impl ByteFmt for PublicKey {
    fn encode(&self) -> Vec<u8> {
        ByteFmt::encode(&self.0)
    }
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        ByteFmt::decode(bytes).map(Self)
    }
}

impl TextFmt for PublicKey {
    fn encode(&self) -> String {
        format!(
            "provisioner:public:bls12_381:{}",
            hex::encode(ByteFmt::encode(&self.0))
        )
    }
    fn decode(text: Text) -> anyhow::Result<Self> {
        text.strip("provisioner:public:bls12_381:")?
            .decode_hex()
            .map(Self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        // Full keys make log lines unreadable, a prefix is enough to tell provisioners apart.
        let raw = ByteFmt::encode(&self.0);
        write!(fmt, "provisioner:{}", hex::encode(&raw[..8]))
    }
}
