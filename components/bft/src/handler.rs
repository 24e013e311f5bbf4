//! Committee membership and vote verification for one round.
use crate::ctx;
use anyhow::Context as _;
use sba_consensus_roles::provisioner::{
    self, Committee, ConsensusMsg, PublicKey, Round, RoundUpdate, Sortition, Step,
};
use std::{collections::BTreeMap, sync::Arc};

/// Reasons to reject an inbound vote.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// Vote of another round. Handlers are bound to a single round.
    #[error("vote for round {got}, handler is at round {want}")]
    OtherRound {
        /// Round of the vote.
        got: Round,
        /// Round of the handler.
        want: Round,
    },
    /// Sender isn't in the committee of the vote's step.
    #[error("sender {sender:?} isn't a member of the committee of step {step}")]
    NonMember {
        /// Sender of the vote.
        sender: Box<PublicKey>,
        /// Step of the vote.
        step: Step,
    },
    /// Signature doesn't match the header.
    #[error("invalid signature: {0:#}")]
    InvalidSignature(#[source] provisioner::Error),
    /// Committee extraction failed.
    #[error(transparent)]
    Internal(#[from] ctx::Error),
}

impl From<Error> for ctx::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Internal(err) => err,
            err => ctx::Error::Internal(err.into()),
        }
    }
}

/// Wraps committee extraction for the round described by a `RoundUpdate`.
/// Committees are extracted lazily, once per step, and never change afterwards.
#[derive(Debug)]
pub(crate) struct Handler {
    ru: Arc<RoundUpdate>,
    sortition: Arc<dyn Sortition>,
    me: PublicKey,
    committees: BTreeMap<Step, Arc<Committee>>,
}

impl Handler {
    pub(crate) fn new(ru: Arc<RoundUpdate>, sortition: Arc<dyn Sortition>, me: PublicKey) -> Self {
        Self {
            ru,
            sortition,
            me,
            committees: BTreeMap::new(),
        }
    }

    pub(crate) fn round_update(&self) -> &RoundUpdate {
        &self.ru
    }

    fn check_round(&self, round: Round) -> Result<(), Error> {
        if round != self.ru.round {
            return Err(Error::OtherRound {
                got: round,
                want: self.ru.round,
            });
        }
        Ok(())
    }

    /// Committee voting at `(round, step)`.
    pub(crate) fn committee(&mut self, round: Round, step: Step) -> Result<Arc<Committee>, Error> {
        self.check_round(round)?;
        if let Some(c) = self.committees.get(&step) {
            return Ok(c.clone());
        }
        let c = Arc::new(
            self.sortition
                .committee(&self.ru, step)
                .with_context(|| format!("committee(round {round}, step {step})"))
                .map_err(ctx::Error::Internal)?,
        );
        self.committees.insert(step, c.clone());
        Ok(c)
    }

    /// Whether `key` votes at `(round, step)`.
    pub(crate) fn is_member(&mut self, key: &PublicKey, round: Round, step: Step) -> Result<bool, Error> {
        Ok(self.committee(round, step)?.contains(key))
    }

    /// Whether the local provisioner votes at `(round, step)`.
    pub(crate) fn am_member(&mut self, round: Round, step: Step) -> Result<bool, Error> {
        Ok(self.committee(round, step)?.contains(&self.me))
    }

    /// Weight a vote of `key` at `(round, step)` carries. 0 for non-members.
    pub(crate) fn voting_weight(&mut self, key: &PublicKey, round: Round, step: Step) -> Result<u64, Error> {
        Ok(self.committee(round, step)?.weight(key))
    }

    /// Checks that the sender of `msg` is a member of the committee of
    /// the message's step and that the signature is valid.
    /// Returns the voting weight of the sender.
    pub(crate) fn verify_signature(&mut self, msg: &ConsensusMsg) -> Result<u64, Error> {
        let header = msg.header();
        let weight = self.voting_weight(&header.sender, header.round, header.step)?;
        if weight == 0 {
            return Err(Error::NonMember {
                sender: header.sender.clone().into(),
                step: header.step,
            });
        }
        msg.signature()
            .verify(&msg.signable(), &header.sender)
            .map_err(Error::InvalidSignature)?;
        Ok(weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sba_consensus_roles::provisioner::{testonly::Setup, BlockHash, Extraction, Reduction};

    #[test]
    fn membership_and_weights() {
        let rng = &mut StdRng::seed_from_u64(1);
        let setup = Setup::new_with_stakes(rng, vec![1, 2, 3]);
        let ru = Arc::new(setup.round_update(rng, 10));
        let outsider: PublicKey = rng.gen();
        let mut handler = Handler::new(ru.clone(), Arc::new(setup.fixed_sortition()), outsider.clone());

        let (round, step) = (ru.round, Step(2));
        assert!(!handler.am_member(round, step).unwrap());
        assert!(handler.is_member(&setup.keys[0].public(), round, step).unwrap());
        for key in &setup.keys {
            let key = key.public();
            let stake = setup.provisioners.stake(&key).unwrap();
            assert_eq!(handler.voting_weight(&key, round, step).unwrap(), stake);
        }
        assert_eq!(handler.voting_weight(&outsider, round, step).unwrap(), 0);
        // 64% of 6 is 3.84.
        assert_eq!(handler.committee(round, step).unwrap().quorum_threshold(), 4);
        assert_matches!(
            handler.committee(round.next(), step),
            Err(Error::OtherRound { .. })
        );
    }

    #[test]
    fn committees_are_stable() {
        let rng = &mut StdRng::seed_from_u64(2);
        let setup = Setup::new(rng, 30);
        let ru = Arc::new(setup.round_update(rng, 16));
        let mut handler = Handler::new(ru.clone(), Arc::new(Extraction), setup.keys[0].public());
        for step in 1..5 {
            let a = handler.committee(ru.round, Step(step)).unwrap();
            let b = Extraction.committee(&ru, Step(step)).unwrap();
            assert_eq!(*a, b);
        }
    }

    #[test]
    fn verify_signature() {
        let rng = &mut StdRng::seed_from_u64(3);
        let setup = Setup::new(rng, 4);
        let ru = Arc::new(setup.round_update(rng, 4));
        let mut handler = Handler::new(ru.clone(), Arc::new(setup.fixed_sortition()), rng.gen());
        let hash: BlockHash = rng.gen();

        let vote = setup.reduction(1, ru.round, Step(2), hash);
        assert_eq!(
            handler
                .verify_signature(&ConsensusMsg::Reduction(vote.clone()))
                .unwrap(),
            1
        );

        // Signature of another member.
        let mut forged = vote.clone();
        forged.signature = setup.reduction(2, ru.round, Step(2), hash).signature;
        assert_matches!(
            handler.verify_signature(&ConsensusMsg::Reduction(forged)),
            Err(Error::InvalidSignature(_))
        );

        // Correctly signed, but not a member.
        let outsider: provisioner::SecretKey = rng.gen();
        let mut header = vote.header.clone();
        header.sender = outsider.public();
        assert_matches!(
            handler.verify_signature(&ConsensusMsg::Reduction(Reduction::sign(&outsider, header))),
            Err(Error::NonMember { .. })
        );
    }
}
