//! Incremental aggregation of the votes of a single step.
use anyhow::Context as _;
use sba_consensus_roles::provisioner::{
    AggregateSignature, BlockHash, Committee, Header, Signature, Signers, StepVotes,
};
use std::collections::{btree_map::Entry, BTreeMap};

/// Votes collected so far for one block hash.
#[derive(Debug)]
struct Bucket {
    signature: AggregateSignature,
    signers: Signers,
    weight: u64,
}

/// Reasons why a vote didn't contribute any weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ignored {
    /// Sender isn't in the committee of the step.
    NonMember,
    /// Sender already voted at this step.
    Duplicate,
    /// A quorum has already been returned for this step.
    Done,
}

/// Folds the votes of one `(round, step)` into per-hash buckets and reports
/// a quorum exactly once, for the first hash whose bucket crosses the threshold.
///
/// Signatures are expected to be verified by the caller. Only members are
/// retained and every member is counted once, so memory is bounded by the
/// committee size no matter how many votes arrive.
#[derive(Debug)]
pub(crate) struct Aggregator {
    committee: std::sync::Arc<Committee>,
    buckets: BTreeMap<BlockHash, Bucket>,
    voted: Signers,
    done: bool,
}

impl Aggregator {
    pub(crate) fn new(committee: std::sync::Arc<Committee>) -> Self {
        Self {
            voted: Signers::new(committee.len()),
            committee,
            buckets: BTreeMap::new(),
            done: false,
        }
    }

    /// Adds a vote. Returns `Ok(Ok(Some(_)))` once a quorum is reached.
    /// `Ok(Err(_))` means the vote was ignored, which is not an error.
    pub(crate) fn collect_vote(
        &mut self,
        header: &Header,
        signature: &Signature,
    ) -> anyhow::Result<Result<Option<StepVotes>, Ignored>> {
        if self.done {
            return Ok(Err(Ignored::Done));
        }
        let Some(i) = self.committee.index(&header.sender) else {
            return Ok(Err(Ignored::NonMember));
        };
        if self.voted.contains(i) {
            return Ok(Err(Ignored::Duplicate));
        }

        let bucket = match self.buckets.entry(header.block_hash) {
            Entry::Occupied(e) => {
                let bucket = e.into_mut();
                bucket
                    .signature
                    .add(signature)
                    .context("signature aggregation")?;
                bucket
            }
            Entry::Vacant(e) => e.insert(Bucket {
                signature: AggregateSignature::aggregate([signature])
                    .context("signature aggregation")?,
                signers: Signers::new(self.committee.len()),
                weight: 0,
            }),
        };
        bucket.signers.insert(i);
        bucket.weight += self.committee.weight(&header.sender);
        self.voted.insert(i);

        tracing::trace!(
            block_hash = ?header.block_hash,
            weight = bucket.weight,
            quorum = self.committee.quorum_threshold(),
            "collected vote from {:?}",
            header.sender,
        );
        if bucket.weight < self.committee.quorum_threshold() {
            return Ok(Ok(None));
        }
        self.done = true;
        Ok(Ok(Some(StepVotes {
            block_hash: header.block_hash,
            signature: Some(bucket.signature.clone()),
            signers: bucket.signers.clone(),
        })))
    }

    /// Weight collected so far for `hash`.
    #[cfg(test)]
    pub(crate) fn weight(&self, hash: &BlockHash) -> u64 {
        self.buckets.get(hash).map_or(0, |b| b.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sba_consensus_roles::provisioner::{testonly::Setup, Reduction, Round, Step};
    use std::sync::Arc;
    use test_casing::test_casing;

    fn collect(agg: &mut Aggregator, v: &Reduction) -> Result<Option<StepVotes>, Ignored> {
        agg.collect_vote(&v.header, &v.signature).unwrap()
    }

    // Unit weights: ceil(0.64 * n) votes make a quorum.
    #[test_casing(5, [(1, 1), (4, 3), (10, 7), (25, 16), (50, 32)])]
    #[test]
    fn quorum_reached_exactly_at_threshold(n: usize, threshold: usize) {
        let rng = &mut StdRng::seed_from_u64(n as u64);
        let setup = Setup::new(rng, n);
        let committee = Arc::new(setup.committee());
        assert_eq!(committee.quorum_threshold() as usize, threshold);
        let (round, step, hash) = (Round(1), Step(2), rng.gen());

        let mut agg = Aggregator::new(committee.clone());
        for i in 0..threshold - 1 {
            assert_matches!(collect(&mut agg, &setup.reduction(i, round, step, hash)), Ok(None));
        }
        let got = collect(&mut agg, &setup.reduction(threshold - 1, round, step, hash))
            .unwrap()
            .unwrap();
        assert_eq!(got.block_hash, hash);
        assert_eq!(got.signers.count(), threshold);
        got.verify(round, step, &committee).unwrap();

        // At most one result per step.
        if threshold < n {
            assert_matches!(
                collect(&mut agg, &setup.reduction(threshold, round, step, hash)),
                Err(Ignored::Done)
            );
        }
    }

    #[test]
    fn non_members_and_duplicates_carry_no_weight() {
        let rng = &mut StdRng::seed_from_u64(7);
        let setup = Setup::new(rng, 10);
        let outsiders = Setup::new(rng, 10);
        let (round, step, hash) = (Round(1), Step(3), rng.gen());
        let mut agg = Aggregator::new(Arc::new(setup.committee()));

        for i in 0..10 {
            assert_matches!(
                collect(&mut agg, &outsiders.reduction(i, round, step, hash)),
                Err(Ignored::NonMember)
            );
        }
        assert_eq!(agg.weight(&hash), 0);

        let vote = setup.reduction(0, round, step, hash);
        assert_matches!(collect(&mut agg, &vote), Ok(None));
        assert_matches!(collect(&mut agg, &vote), Err(Ignored::Duplicate));
        // Switching to another hash doesn't count either.
        let other = setup.reduction(0, round, step, rng.gen());
        assert_matches!(collect(&mut agg, &other), Err(Ignored::Duplicate));
        assert_eq!(agg.weight(&hash), 1);
    }

    #[test]
    fn competing_hashes_are_tracked_separately() {
        let rng = &mut StdRng::seed_from_u64(8);
        let setup = Setup::new(rng, 10);
        let (round, step) = (Round(4), Step(6));
        let (a, b): (BlockHash, BlockHash) = (rng.gen(), rng.gen());
        let mut agg = Aggregator::new(Arc::new(setup.committee()));

        // 3 votes for `a`, then 7 for `b`: only `b` reaches the threshold of 7.
        for i in 0..3 {
            assert_matches!(collect(&mut agg, &setup.reduction(i, round, step, a)), Ok(None));
        }
        for i in 3..9 {
            assert_matches!(collect(&mut agg, &setup.reduction(i, round, step, b)), Ok(None));
        }
        let got = collect(&mut agg, &setup.reduction(9, round, step, b))
            .unwrap()
            .unwrap();
        assert_eq!(got.block_hash, b);
        assert_eq!(got.signers.count(), 7);
        assert!(!got.signers.contains(0));
        assert_eq!(agg.weight(&a), 3);
    }

    #[test]
    fn stake_weighted_quorum() {
        let rng = &mut StdRng::seed_from_u64(9);
        // Total weight 10, threshold 7.
        let setup = Setup::new_with_stakes(rng, vec![6, 1, 1, 1, 1]);
        let committee = Arc::new(setup.committee());
        let (round, step, hash) = (Round(1), Step(2), rng.gen());
        let stake = |i: usize| setup.provisioners.stake(&setup.keys[i].public()).unwrap();
        let heavy = (0..5).find(|i| stake(*i) == 6).unwrap();
        let light = (0..5).find(|i| stake(*i) == 1).unwrap();

        let mut agg = Aggregator::new(committee.clone());
        assert_matches!(collect(&mut agg, &setup.reduction(heavy, round, step, hash)), Ok(None));
        let got = collect(&mut agg, &setup.reduction(light, round, step, hash))
            .unwrap()
            .unwrap();
        assert_eq!(got.signers.count(), 2);
        assert_eq!(got.signers.weight(&committee), 7);
    }
}
