//! Committee votes: reduction and agreement.
use crate::provisioner::{
    wire::{self, Read, Write},
    Header, SecretKey, Signature, StepVotes,
};
use bytes::{Buf, BufMut};
use sba_consensus_crypto::keccak256::Keccak256;

/// Vote of a reduction committee member for `header.block_hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduction {
    /// Target of the vote. `header.sender` is the voter.
    pub header: Header,
    /// Signature over `header.signable()`.
    pub signature: Signature,
}

impl Reduction {
    /// Signs a reduction vote. `header.sender` has to be the public key of `key`.
    pub fn sign(key: &SecretKey, header: Header) -> Self {
        debug_assert_eq!(header.sender, key.public());
        Self {
            signature: key.sign(&header.signable()),
            header,
        }
    }

    /// Bytes covered by the signature.
    pub fn signable(&self) -> [u8; super::SIGNABLE_LEN] {
        self.header.signable()
    }
}

impl Write for Reduction {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.signature.write(buf);
    }
}

impl Read for Reduction {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            header: Header::read(buf)?,
            signature: Signature::read(buf)?,
        })
    }
}

/// Vote of an agreement committee member. It carries the step votes of both
/// reduction steps, which justify `header.block_hash`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agreement {
    /// Target of the vote. `header.sender` is the voter.
    pub header: Header,
    /// Signature over the header and the step votes.
    pub signature: Signature,
    /// Step votes of the first and second reduction.
    pub votes: [StepVotes; 2],
}

impl Agreement {
    /// Signs an agreement vote. `header.sender` has to be the public key of `key`.
    pub fn sign(key: &SecretKey, header: Header, votes: [StepVotes; 2]) -> Self {
        debug_assert_eq!(header.sender, key.public());
        let digest = Self::digest(&header, &votes);
        Self {
            signature: key.sign(digest.as_bytes()),
            header,
            votes,
        }
    }

    fn digest(header: &Header, votes: &[StepVotes; 2]) -> Keccak256 {
        let [first, second] = votes;
        Keccak256::concat([
            &header.signable()[..],
            &wire::encode(first)[..],
            &wire::encode(second)[..],
        ])
    }

    /// Bytes covered by the signature. Binding the step votes makes an
    /// agreement vote unusable as a reduction vote and vice versa.
    pub fn signable(&self) -> [u8; 32] {
        *Self::digest(&self.header, &self.votes).as_bytes()
    }
}

impl Write for Agreement {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.signature.write(buf);
        self.votes[0].write(buf);
        self.votes[1].write(buf);
    }
}

impl Read for Agreement {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            header: Header::read(buf)?,
            signature: Signature::read(buf)?,
            votes: [StepVotes::read(buf)?, StepVotes::read(buf)?],
        })
    }
}
