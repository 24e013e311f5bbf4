//! Test-only utilities.
use super::{
    AggregateSignature, BlockHash, Candidate, Committee, Header, Provisioners, Reduction, Round,
    RoundUpdate, SecretKey, Seed, Signers, Sortition, Step, StepVotes, WeightedMember,
};
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use std::sync::Arc;

impl Distribution<BlockHash> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BlockHash {
        BlockHash(rng.gen())
    }
}

impl Distribution<Seed> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Seed {
        Seed(rng.gen())
    }
}

impl Distribution<Candidate> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Candidate {
        let n = rng.gen_range(0..4);
        Candidate {
            round: Round(rng.gen_range(1..1000)),
            prev_hash: rng.gen(),
            seed: rng.gen(),
            payload: (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect(),
            coinbase: (0..n).map(|_| rng.gen()).collect(),
        }
    }
}

/// Sortition stub returning the same committee for every round and step.
#[derive(Debug, Clone)]
pub struct Fixed(pub Committee);

impl Sortition for Fixed {
    fn committee(&self, _: &RoundUpdate, _: Step) -> anyhow::Result<Committee> {
        Ok(self.0.clone())
    }
}

/// Provisioner set for tests.
/// `keys` are sorted like committee members, so that `keys[i]` has index `i`
/// in `Setup::committee()`.
#[derive(Debug, Clone)]
pub struct Setup {
    /// Provisioner secret keys.
    pub keys: Vec<SecretKey>,
    /// Stake set of the provisioners.
    pub provisioners: Arc<Provisioners>,
}

impl Setup {
    /// `n` provisioners with equal stake.
    pub fn new(rng: &mut impl Rng, n: usize) -> Self {
        Self::new_with_stakes(rng, vec![1; n])
    }

    /// One provisioner per entry of `stakes`.
    pub fn new_with_stakes(rng: &mut impl Rng, stakes: Vec<u64>) -> Self {
        let mut keys: Vec<(SecretKey, u64)> = stakes.into_iter().map(|s| (rng.gen(), s)).collect();
        keys.sort_by_key(|(k, _)| k.public());
        Self {
            provisioners: Arc::new(
                Provisioners::new(keys.iter().map(|(k, s)| (k.public(), *s))).unwrap(),
            ),
            keys: keys.into_iter().map(|(k, _)| k).collect(),
        }
    }

    /// Committee of all provisioners, weighted by stake.
    pub fn committee(&self) -> Committee {
        Committee::new(self.provisioners.iter().map(|(key, weight)| WeightedMember {
            key: key.clone(),
            weight,
        }))
        .unwrap()
    }

    /// Sortition returning `self.committee()` for every step.
    pub fn fixed_sortition(&self) -> Fixed {
        Fixed(self.committee())
    }

    /// Round 1 update with a random seed.
    pub fn round_update(&self, rng: &mut impl Rng, committee_size: usize) -> RoundUpdate {
        RoundUpdate {
            round: Round(1),
            provisioners: self.provisioners.clone(),
            seed: rng.gen(),
            committee_size,
            prev_hash: rng.gen(),
        }
    }

    /// Reduction vote of provisioner `i`.
    pub fn reduction(&self, i: usize, round: Round, step: Step, block_hash: BlockHash) -> Reduction {
        let key = &self.keys[i];
        Reduction::sign(
            key,
            Header {
                round,
                step,
                block_hash,
                sender: key.public(),
            },
        )
    }

    /// Step votes of the provisioners `signers` (indices into `self.keys`),
    /// valid against `self.committee()`.
    pub fn step_votes(
        &self,
        round: Round,
        step: Step,
        block_hash: BlockHash,
        signers: impl IntoIterator<Item = usize>,
    ) -> StepVotes {
        let mut bits = Signers::new(self.keys.len());
        let mut sigs = vec![];
        for i in signers {
            bits.insert(i);
            sigs.push(self.reduction(i, round, step, block_hash).signature);
        }
        StepVotes {
            block_hash,
            signature: Some(AggregateSignature::aggregate(&sigs).unwrap()),
            signers: bits,
        }
    }
}
