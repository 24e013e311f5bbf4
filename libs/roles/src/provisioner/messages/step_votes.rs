//! Aggregated votes of one reduction step.
use crate::provisioner::{
    signable,
    wire::{self, Read, Write},
    AggregateSignature, BlockHash, Committee, Error, Round, Step,
};
use bit_vec::BitVec;
use bytes::{Buf, BufMut};
use sba_consensus_crypto::{bls12_381::SIGNATURE_BYTES_LEN, ByteFmt as _};

/// Bitmap of committee members, indexed like `Committee`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signers(pub BitVec);

impl Signers {
    /// Empty bitmap for a committee of `n` members.
    pub fn new(n: usize) -> Self {
        Self(BitVec::from_elem(n, false))
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|b| *b).count()
    }

    /// Size of the committee the bitmap refers to.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0.none()
    }

    /// Whether member `i` is set. Out of range indices are not.
    pub fn contains(&self, i: usize) -> bool {
        self.0.get(i).unwrap_or(false)
    }

    /// Sets member `i`. Returns false if it was already set.
    pub fn insert(&mut self, i: usize) -> bool {
        if self.contains(i) {
            return false;
        }
        self.0.set(i, true);
        true
    }

    /// Sum of weights of the set members.
    /// Panics if the bitmap doesn't match the committee size.
    pub fn weight(&self, committee: &Committee) -> u64 {
        assert_eq!(self.len(), committee.len());
        committee
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0[*i])
            .map(|(_, m)| m.weight)
            .sum()
    }
}

impl Write for Signers {
    fn write(&self, buf: &mut impl BufMut) {
        // Committees are bounded by the wire list limit, far below u16::MAX.
        buf.put_u16_le(self.0.len() as u16);
        buf.put_slice(&self.0.to_bytes());
    }
}

impl Read for Signers {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        let len = usize::from(u16::from_le_bytes(wire::read_array(buf)?));
        if len > wire::MAX_LIST_LEN {
            return Err(wire::Error::LengthExceeded(len, wire::MAX_LIST_LEN));
        }
        let n_bytes = len.div_ceil(8);
        if buf.remaining() < n_bytes {
            return Err(wire::Error::EndOfBuffer);
        }
        let mut bits = BitVec::from_bytes(&buf.copy_to_bytes(n_bytes));
        if bits.iter().skip(len).any(|b| b) {
            return Err(wire::Error::Invalid(
                "signers",
                anyhow::anyhow!("padding bits set"),
            ));
        }
        bits.truncate(len);
        Ok(Self(bits))
    }
}

/// Result of a reduction step: the aggregated votes of committee
/// members for one block hash.
///
/// `StepVotes::empty()` (zero hash, no signature) means that the step
/// ended without agreement. It is a regular outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepVotes {
    /// Hash the votes are for.
    pub block_hash: BlockHash,
    /// Aggregate of the members' signatures, `None` for the empty result.
    pub signature: Option<AggregateSignature>,
    /// Members whose signatures are in `signature`.
    pub signers: Signers,
}

/// Error returned by `StepVotes::verify()`.
#[derive(Debug, thiserror::Error)]
pub enum StepVotesVerifyError {
    /// The empty result certifies nothing.
    #[error("empty step votes")]
    Empty,
    /// Bitmap size doesn't match the committee.
    #[error("signers set doesn't match committee: got {got}, want {want}")]
    BadSignersSet {
        /// Bitmap size.
        got: usize,
        /// Committee size.
        want: usize,
    },
    /// Signers don't reach a quorum.
    #[error("signers weight {got} below quorum threshold {want}")]
    NotEnoughWeight {
        /// Signers weight.
        got: u64,
        /// Quorum threshold.
        want: u64,
    },
    /// Aggregate signature doesn't match the signers.
    #[error("bad signature: {0:#}")]
    BadSignature(#[source] Error),
}

impl StepVotes {
    /// The "no agreement" result.
    pub fn empty() -> Self {
        Self {
            block_hash: BlockHash::EMPTY,
            signature: None,
            signers: Signers::new(0),
        }
    }

    /// Whether this is the "no agreement" result.
    pub fn is_empty(&self) -> bool {
        self.block_hash.is_empty() || self.signature.is_none()
    }

    /// Checks that a quorum of `committee`, the committee of `(round, step)`,
    /// signed `block_hash`. The aggregate public key is rebuilt from the signers bitmap.
    pub fn verify(
        &self,
        round: Round,
        step: Step,
        committee: &Committee,
    ) -> Result<(), StepVotesVerifyError> {
        let Some(signature) = &self.signature else {
            return Err(StepVotesVerifyError::Empty);
        };
        if self.block_hash.is_empty() {
            return Err(StepVotesVerifyError::Empty);
        }
        if self.signers.len() != committee.len() {
            return Err(StepVotesVerifyError::BadSignersSet {
                got: self.signers.len(),
                want: committee.len(),
            });
        }
        let weight = self.signers.weight(committee);
        if weight < committee.quorum_threshold() {
            return Err(StepVotesVerifyError::NotEnoughWeight {
                got: weight,
                want: committee.quorum_threshold(),
            });
        }
        let msg = signable(round, step, &self.block_hash);
        signature
            .verify(&msg, committee.subset(&self.signers))
            .map_err(StepVotesVerifyError::BadSignature)
    }
}

impl Write for StepVotes {
    fn write(&self, buf: &mut impl BufMut) {
        self.block_hash.write(buf);
        self.signers.write(buf);
        match &self.signature {
            Some(sig) => buf.put_slice(&sig.encode()),
            None => buf.put_bytes(0, SIGNATURE_BYTES_LEN),
        }
    }
}

impl Read for StepVotes {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        let block_hash = BlockHash::read(buf)?;
        let signers = Signers::read(buf)?;
        let raw: [u8; SIGNATURE_BYTES_LEN] = wire::read_array(buf)?;
        let signature = if raw.iter().all(|b| *b == 0) {
            None
        } else {
            let sig = AggregateSignature::decode(&raw)
                .map_err(|err| wire::Error::Invalid("step votes signature", err))?;
            Some(sig)
        };
        Ok(Self {
            block_hash,
            signature,
            signers,
        })
    }
}
