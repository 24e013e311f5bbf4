//! Block proposals: the candidate block and the blind-bid score backing it.
use crate::provisioner::{
    wire::{self, Read, Write},
    BlockHash, Header, PublicKey, Round, Seed, SecretKey, Signature,
};
use bytes::{Buf, BufMut};
use sba_consensus_crypto::keccak256::Keccak256;

/// Candidate block. The payload is opaque to consensus;
/// `coinbase` lists the provisioners rewarded by the block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Round the block was generated for.
    pub round: Round,
    /// Block the candidate extends.
    pub prev_hash: BlockHash,
    /// Seed of the next round.
    pub seed: Seed,
    /// Opaque block body.
    pub payload: Vec<u8>,
    /// Recipients of the coinbase reward.
    pub coinbase: Vec<PublicKey>,
}

impl Candidate {
    /// Hash identifying the block.
    pub fn hash(&self) -> BlockHash {
        BlockHash(*Keccak256::new(&wire::encode(self)).as_bytes())
    }
}

impl Write for Candidate {
    fn write(&self, buf: &mut impl BufMut) {
        self.round.0.write(buf);
        self.prev_hash.write(buf);
        self.seed.write(buf);
        self.payload.write(buf);
        wire::write_list(&self.coinbase, buf);
    }
}

impl Read for Candidate {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            round: Round(u64::read(buf)?),
            prev_hash: BlockHash::read(buf)?,
            seed: Seed::read(buf)?,
            payload: Vec::read(buf)?,
            coinbase: wire::read_list(buf)?,
        })
    }
}

/// A candidate block, as gossiped by its generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateMsg {
    /// `header.block_hash` is `block.hash()`.
    pub header: Header,
    /// Generator's signature over `header.signable()`.
    pub signature: Signature,
    /// The block.
    pub block: Candidate,
}

impl CandidateMsg {
    /// Wraps `block` into a message signed by `key` at `header` position.
    pub fn sign(key: &SecretKey, mut header: Header, block: Candidate) -> Self {
        header.block_hash = block.hash();
        Self {
            signature: key.sign(&header.signable()),
            header,
            block,
        }
    }
}

impl Write for CandidateMsg {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.signature.write(buf);
        self.block.write(buf);
    }
}

impl Read for CandidateMsg {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            header: Header::read(buf)?,
            signature: Signature::read(buf)?,
            block: Candidate::read(buf)?,
        })
    }
}

/// Score of a blind-bid proof, proposing `header.block_hash` for selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Score {
    /// Position of the proposal and the proposed hash.
    pub header: Header,
    /// Generator's signature over `Score::signable()`.
    pub signature: Signature,
    /// Score derived from the proof. Higher wins.
    pub score: u64,
    /// Opaque blind-bid proof.
    pub proof: Vec<u8>,
    /// Seed the proof was generated for.
    pub seed: Seed,
}

impl Score {
    /// Signs a score proposal.
    pub fn sign(key: &SecretKey, header: Header, score: u64, proof: Vec<u8>, seed: Seed) -> Self {
        let digest = Self::digest(&header, score, &proof, &seed);
        Self {
            signature: key.sign(digest.as_bytes()),
            header,
            score,
            proof,
            seed,
        }
    }

    fn digest(header: &Header, score: u64, proof: &[u8], seed: &Seed) -> Keccak256 {
        Keccak256::concat([
            &header.signable()[..],
            &score.to_le_bytes()[..],
            &seed.0[..],
            proof,
        ])
    }

    /// Bytes covered by the signature.
    pub fn signable(&self) -> [u8; 32] {
        *Self::digest(&self.header, self.score, &self.proof, &self.seed).as_bytes()
    }

    /// Whether `self` beats `other` in selection: higher score first,
    /// lower hash on a tie.
    pub fn beats(&self, other: &Self) -> bool {
        (self.score, std::cmp::Reverse(self.header.block_hash))
            > (other.score, std::cmp::Reverse(other.header.block_hash))
    }
}

impl Write for Score {
    fn write(&self, buf: &mut impl BufMut) {
        self.header.write(buf);
        self.signature.write(buf);
        self.score.write(buf);
        self.proof.write(buf);
        self.seed.write(buf);
    }
}

impl Read for Score {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            header: Header::read(buf)?,
            signature: Signature::read(buf)?,
            score: u64::read(buf)?,
            proof: Vec::read(buf)?,
            seed: Seed::read(buf)?,
        })
    }
}
