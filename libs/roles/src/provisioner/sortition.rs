//! Committee extraction from the provisioner stake set.
use super::{Committee, RoundUpdate, Step, WeightedMember};
use anyhow::Context as _;
use sba_consensus_crypto::keccak256::Keccak256;
use std::{collections::BTreeMap, fmt};

/// Source of committees. Implementations must be deterministic:
/// every node has to extract the same committee for the same inputs.
pub trait Sortition: 'static + fmt::Debug + Send + Sync {
    /// Committee voting at `step` of the round described by `ru`.
    fn committee(&self, ru: &RoundUpdate, step: Step) -> anyhow::Result<Committee>;
}

/// Stake-weighted extraction: `committee_size` seats are drawn from the seed,
/// each seat lands on a provisioner with probability proportional to its stake.
/// A provisioner drawn `k` times votes with weight `k`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extraction;

impl Extraction {
    /// Stake score of the `seat`-th draw, uniform over `0..total_stake`.
    fn draw(ru: &RoundUpdate, step: Step, seat: u32) -> u64 {
        let hash = Keccak256::concat([
            &ru.seed.0[..],
            &ru.round.0.to_le_bytes()[..],
            &[step.0][..],
            &seat.to_le_bytes()[..],
        ]);
        let mut head = [0; 16];
        head.copy_from_slice(&hash.as_bytes()[..16]);
        // 128 bits of hash keep the modulo bias negligible.
        let total = u128::from(ru.provisioners.total_stake());
        (u128::from_le_bytes(head) % total) as u64
    }
}

impl Sortition for Extraction {
    fn committee(&self, ru: &RoundUpdate, step: Step) -> anyhow::Result<Committee> {
        anyhow::ensure!(ru.committee_size > 0, "committee size has to be positive");
        let seats = u32::try_from(ru.committee_size).context("committee size")?;
        let mut weights = BTreeMap::new();
        for seat in 0..seats {
            let mut score = Self::draw(ru, step, seat);
            for (key, stake) in ru.provisioners.iter() {
                if score < stake {
                    *weights.entry(key.clone()).or_insert(0) += 1;
                    break;
                }
                score -= stake;
            }
        }
        Committee::new(
            weights
                .into_iter()
                .map(|(key, weight)| WeightedMember { key, weight }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::testonly::Setup;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn extraction_is_deterministic() {
        let rng = &mut StdRng::seed_from_u64(1);
        let setup = Setup::new(rng, 20);
        let ru = setup.round_update(rng, 64);
        let a = Extraction.committee(&ru, Step(2)).unwrap();
        let b = Extraction.committee(&ru, Step(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_weight(), 64);
        assert!(a.keys().all(|k| ru.provisioners.stake(k).is_some()));
    }

    #[test]
    fn extraction_depends_on_step() {
        let rng = &mut StdRng::seed_from_u64(2);
        let setup = Setup::new(rng, 50);
        let ru = setup.round_update(rng, 64);
        let committees: Vec<_> = (1..=4)
            .map(|s| Extraction.committee(&ru, Step(s)).unwrap())
            .collect();
        assert!(committees.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn single_provisioner_takes_every_seat() {
        let rng = &mut StdRng::seed_from_u64(3);
        let setup = Setup::new(rng, 1);
        let ru = setup.round_update(rng, 10);
        let committee = Extraction.committee(&ru, Step::FIRST).unwrap();
        assert_eq!(committee.len(), 1);
        assert_eq!(committee.total_weight(), 10);
    }
}
