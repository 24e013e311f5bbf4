//! Round, step and the header common to every consensus message.
use crate::provisioner::{
    wire::{self, Read, Write},
    PublicKey,
};
use bytes::{Buf, BufMut};
use std::{cmp::Ordering, fmt};

/// Round number. One round agrees on one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Round(pub u64);

impl Round {
    /// The round after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Step within a round. Starts at 1 for every round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Step(pub u8);

impl Step {
    /// First step of every round.
    pub const FIRST: Self = Self(1);

    /// The step `n` steps after this one, if it still fits.
    pub fn add(self, n: u8) -> Option<Self> {
        self.0.checked_add(n).map(Self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hash of a candidate block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The hash voted for when there is no valid candidate.
    pub const EMPTY: Self = Self([0; 32]);

    /// Whether this is the empty hash.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("block:empty");
        }
        write!(f, "block:{}", hex::encode(&self.0[..8]))
    }
}

/// Per round randomness which drives committee extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Seed(pub [u8; 32]);

/// Position of a message relative to the local (round, step).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    /// Older round, or the current round with an older step.
    Before,
    /// Exactly the local round and step.
    Same,
    /// Newer round, or the current round with a newer step.
    After,
}

/// Length of the signable part of a header.
pub const SIGNABLE_LEN: usize = 8 + 1 + 32;

/// Canonical bytes committee members sign when voting for `block_hash`.
pub fn signable(round: Round, step: Step, block_hash: &BlockHash) -> [u8; SIGNABLE_LEN] {
    let mut raw = [0; SIGNABLE_LEN];
    raw[..8].copy_from_slice(&round.0.to_le_bytes());
    raw[8] = step.0;
    raw[9..].copy_from_slice(&block_hash.0);
    raw
}

/// Header attached to every consensus message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Round the message belongs to.
    pub round: Round,
    /// Step the message belongs to.
    pub step: Step,
    /// Block hash the message refers to.
    pub block_hash: BlockHash,
    /// Author of the message.
    pub sender: PublicKey,
}

impl Header {
    /// Compares the header position with the local `(round, step)`.
    /// Rounds are compared first, then steps.
    pub fn compare(&self, round: Round, step: Step) -> Position {
        match (self.round, self.step).cmp(&(round, step)) {
            Ordering::Less => Position::Before,
            Ordering::Equal => Position::Same,
            Ordering::Greater => Position::After,
        }
    }

    /// Bytes signed by the sender. The sender itself is not part of them,
    /// so that votes of different members for the same target aggregate.
    pub fn signable(&self) -> [u8; SIGNABLE_LEN] {
        signable(self.round, self.step, &self.block_hash)
    }
}

impl Write for Header {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.round.0);
        buf.put_u8(self.step.0);
        buf.put_slice(&self.block_hash.0);
        self.sender.write(buf);
    }
}

impl Read for Header {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(Self {
            round: Round(u64::read(buf)?),
            step: Step(u8::read(buf)?),
            block_hash: BlockHash::read(buf)?,
            sender: PublicKey::read(buf)?,
        })
    }
}

impl Write for BlockHash {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Read for BlockHash {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        wire::read_array(buf).map(Self)
    }
}

impl Write for Seed {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Read for Seed {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        wire::read_array(buf).map(Self)
    }
}
