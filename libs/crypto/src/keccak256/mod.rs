//! Keccak-256 hashing.
use crate::ByteFmt;
use sha3::{digest::Update, Digest as _};

#[cfg(test)]
mod tests;
pub mod testonly;

/// Keccak-256 digest.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keccak256(pub(crate) [u8; 32]);

impl Keccak256 {
    /// Hashes `msg`.
    pub fn new(msg: &[u8]) -> Self {
        Self(sha3::Keccak256::new().chain(msg).finalize().into())
    }

    /// Hashes the concatenation of `parts` without allocating it.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = sha3::Keccak256::new();
        for part in parts {
            Update::update(&mut hasher, part);
        }
        Self(hasher.finalize().into())
    }

    /// Digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl ByteFmt for Keccak256 {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self(bytes.try_into()?))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for Keccak256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "keccak256:{}", hex::encode(self.0))
    }
}
