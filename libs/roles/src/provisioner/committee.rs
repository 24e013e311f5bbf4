//! Committees and the stake set they are extracted from.
use super::{BlockHash, PublicKey, Round, Seed, Signers};
use anyhow::Context as _;
use std::{collections::BTreeMap, sync::Arc};

/// Percentage of committee weight which has to be reached for a quorum.
pub const QUORUM_PERCENT: u64 = 64;

/// Minimal voting weight needed to finalize a step: at least
/// `QUORUM_PERCENT` percent of `total_weight`, i.e. `ceil(total * 64 / 100)`.
pub fn quorum_threshold(total_weight: u64) -> u64 {
    // Split to avoid overflowing the multiplication.
    let (q, r) = (total_weight / 100, total_weight % 100);
    q * QUORUM_PERCENT + (r * QUORUM_PERCENT).div_ceil(100)
}

/// Voting weight.
pub type Weight = u64;

/// Committee member together with its voting weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedMember {
    /// Member key.
    pub key: PublicKey,
    /// Weight of the member's vote.
    pub weight: Weight,
}

/// Voting committee of a single (round, step).
/// Members are ordered by key, and the position of a member
/// in this order is its index in `Signers` bitmaps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committee {
    vec: Vec<WeightedMember>,
    indexes: BTreeMap<PublicKey, usize>,
    total_weight: u64,
}

impl Committee {
    /// Builds a committee. Fails on duplicate keys, zero weights and empty input.
    pub fn new(members: impl IntoIterator<Item = WeightedMember>) -> anyhow::Result<Self> {
        let mut map = BTreeMap::new();
        let mut total_weight: u64 = 0;
        for m in members {
            anyhow::ensure!(!map.contains_key(&m.key), "duplicate committee member");
            anyhow::ensure!(m.weight > 0, "member weight has to be positive");
            total_weight = total_weight
                .checked_add(m.weight)
                .context("sum of weights overflows")?;
            map.insert(m.key.clone(), m);
        }
        anyhow::ensure!(!map.is_empty(), "committee must not be empty");
        let vec: Vec<_> = map.into_values().collect();
        Ok(Self {
            indexes: vec
                .iter()
                .enumerate()
                .map(|(i, m)| (m.key.clone(), i))
                .collect(),
            vec,
            total_weight,
        })
    }

    /// Iterates over members in index order.
    pub fn iter(&self) -> impl Iterator<Item = &WeightedMember> {
        self.vec.iter()
    }

    /// Iterates over member keys in index order.
    pub fn keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.vec.iter().map(|m| &m.key)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Whether `key` belongs to the committee.
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.indexes.contains_key(key)
    }

    /// Member at `index`.
    pub fn get(&self, index: usize) -> Option<&WeightedMember> {
        self.vec.get(index)
    }

    /// Index of `key` in the committee.
    pub fn index(&self, key: &PublicKey) -> Option<usize> {
        self.indexes.get(key).copied()
    }

    /// Weight of `key`, 0 for non-members.
    pub fn weight(&self, key: &PublicKey) -> Weight {
        self.index(key).map_or(0, |i| self.vec[i].weight)
    }

    /// Sum of all member weights.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Weight needed for a quorum of this committee.
    pub fn quorum_threshold(&self) -> u64 {
        quorum_threshold(self.total_weight)
    }

    /// Keys of the members set in `signers`, in index order.
    /// Signers beyond the committee size are ignored.
    pub fn subset<'a>(&'a self, signers: &'a Signers) -> impl Iterator<Item = &'a PublicKey> {
        self.vec
            .iter()
            .enumerate()
            .filter(|(i, _)| signers.contains(*i))
            .map(|(_, m)| &m.key)
    }
}

/// Staked participants eligible for committees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioners {
    stakes: BTreeMap<PublicKey, u64>,
    total_stake: u64,
}

impl Provisioners {
    /// Builds the stake set. Fails on duplicates, zero stakes and empty input.
    pub fn new(stakes: impl IntoIterator<Item = (PublicKey, u64)>) -> anyhow::Result<Self> {
        let mut map = BTreeMap::new();
        let mut total_stake: u64 = 0;
        for (key, stake) in stakes {
            anyhow::ensure!(stake > 0, "stake has to be positive");
            total_stake = total_stake
                .checked_add(stake)
                .context("sum of stakes overflows")?;
            anyhow::ensure!(map.insert(key, stake).is_none(), "duplicate provisioner");
        }
        anyhow::ensure!(!map.is_empty(), "provisioner set must not be empty");
        Ok(Self {
            stakes: map,
            total_stake,
        })
    }

    /// Iterates over `(key, stake)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, u64)> {
        self.stakes.iter().map(|(k, s)| (k, *s))
    }

    /// Number of provisioners.
    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    /// Stake of `key`, if it is a provisioner.
    pub fn stake(&self, key: &PublicKey) -> Option<u64> {
        self.stakes.get(key).copied()
    }

    /// Sum of all stakes.
    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }
}

/// Everything a round needs to know about the chain it builds on.
/// Immutable once the round starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundUpdate {
    /// Round to run.
    pub round: Round,
    /// Stake snapshot committees are extracted from.
    pub provisioners: Arc<Provisioners>,
    /// Round randomness.
    pub seed: Seed,
    /// Number of committee seats per step.
    pub committee_size: usize,
    /// Hash of the block this round extends.
    pub prev_hash: BlockHash,
}
