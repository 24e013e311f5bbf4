//! Buffer of messages which arrived before the local node got to their round and step.
use sba_consensus_roles::provisioner::{ConsensusMsg, Round, Step};
use std::collections::BTreeMap;

/// Messages this many rounds (or more) ahead of the current round are dropped.
pub(crate) const HORIZON: u64 = 10;
/// Maximal number of messages buffered for a single (round, step).
pub(crate) const STEP_CAPACITY: usize = 1024;

/// Why a message wasn't queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejected {
    /// Older than the current round or at least `HORIZON` rounds ahead.
    OutOfRange,
    /// The sender already has a message of that type queued for the step.
    Duplicate,
    /// `STEP_CAPACITY` messages are already queued for the step.
    Full,
}

/// Future messages keyed by (round, step), in arrival order per key.
#[derive(Debug, Default)]
pub(crate) struct Queue {
    round: Round,
    events: BTreeMap<(Round, Step), Vec<ConsensusMsg>>,
}

impl Queue {
    /// Moves the queue to `round`, dropping everything buffered for older rounds.
    pub(crate) fn advance(&mut self, round: Round) {
        self.round = round;
        self.events = self.events.split_off(&(round, Step(0)));
    }

    /// Buffers `msg` for `(round, step)`. Keeps at most one message per
    /// sender and message type, and at most `STEP_CAPACITY` per step.
    pub(crate) fn put(&mut self, round: Round, step: Step, msg: ConsensusMsg) -> Result<(), Rejected> {
        match round.0.checked_sub(self.round.0) {
            Some(ahead) if ahead < HORIZON => {}
            _ => return Err(Rejected::OutOfRange),
        }
        let msgs = self.events.entry((round, step)).or_default();
        let (sender, topic) = (&msg.header().sender, msg.topic());
        if msgs
            .iter()
            .any(|m| m.topic() == topic && &m.header().sender == sender)
        {
            return Err(Rejected::Duplicate);
        }
        if msgs.len() >= STEP_CAPACITY {
            return Err(Rejected::Full);
        }
        msgs.push(msg);
        Ok(())
    }

    /// Takes all messages buffered for exactly `(round, step)`.
    pub(crate) fn drain(&mut self, round: Round, step: Step) -> Vec<ConsensusMsg> {
        self.events.remove(&(round, step)).unwrap_or_default()
    }

    /// Number of buffered messages.
    pub(crate) fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use sba_consensus_roles::provisioner::{
        testonly::Setup, BlockHash, Header, Reduction, SecretKey,
    };

    fn vote(setup: &Setup, round: u64, step: u8) -> ConsensusMsg {
        ConsensusMsg::Reduction(setup.reduction(0, Round(round), Step(step), BlockHash::EMPTY))
    }

    #[test]
    fn horizon() {
        let rng = &mut StdRng::seed_from_u64(1);
        let setup = Setup::new(rng, 1);
        let mut queue = Queue::default();
        queue.advance(Round(5));

        for round in 6..15 {
            queue.put(Round(round), Step(2), vote(&setup, round, 2)).unwrap();
        }
        assert_eq!(
            queue.put(Round(15), Step(2), vote(&setup, 15, 2)),
            Err(Rejected::OutOfRange)
        );
        assert_eq!(
            queue.put(Round(4), Step(2), vote(&setup, 4, 2)),
            Err(Rejected::OutOfRange)
        );
        assert_eq!(queue.len(), 9);

        for round in 6..15 {
            assert_eq!(queue.drain(Round(round), Step(2)), vec![vote(&setup, round, 2)]);
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn drain_is_exact_and_ordered() {
        let rng = &mut StdRng::seed_from_u64(2);
        let setup = Setup::new(rng, 3);
        let mut queue = Queue::default();
        queue.advance(Round(1));
        let msgs: Vec<_> = (0..3)
            .map(|i| {
                ConsensusMsg::Reduction(setup.reduction(i, Round(1), Step(3), BlockHash([i as u8; 32])))
            })
            .collect();
        for m in &msgs {
            queue.put(Round(1), Step(3), m.clone()).unwrap();
        }
        queue.put(Round(1), Step(4), vote(&setup, 1, 4)).unwrap();

        assert!(queue.drain(Round(1), Step(2)).is_empty());
        assert_eq!(queue.drain(Round(1), Step(3)), msgs);
        // Draining again is safe.
        assert!(queue.drain(Round(1), Step(3)).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn advance_prunes_old_rounds() {
        let rng = &mut StdRng::seed_from_u64(3);
        let setup = Setup::new(rng, 1);
        let mut queue = Queue::default();
        queue.advance(Round(1));
        queue.put(Round(2), Step(1), vote(&setup, 2, 1)).unwrap();
        queue.put(Round(3), Step(1), vote(&setup, 3, 1)).unwrap();
        queue.advance(Round(3));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(Round(3), Step(1)).len(), 1);
    }

    #[test]
    fn one_message_per_sender_and_topic() {
        let rng = &mut StdRng::seed_from_u64(4);
        let setup = Setup::new(rng, 2);
        let mut queue = Queue::default();
        queue.advance(Round(1));
        let first = setup.reduction(0, Round(2), Step(2), rng.gen());
        queue.put(Round(2), Step(2), ConsensusMsg::Reduction(first.clone())).unwrap();
        // Equivocating vote of the same sender.
        let second = setup.reduction(0, Round(2), Step(2), rng.gen());
        assert_eq!(
            queue.put(Round(2), Step(2), ConsensusMsg::Reduction(second)),
            Err(Rejected::Duplicate)
        );
        // Same sender at another step, another sender at the same step.
        queue.put(Round(2), Step(3), vote(&setup, 2, 3)).unwrap();
        let other = setup.reduction(1, Round(2), Step(2), BlockHash::EMPTY);
        queue.put(Round(2), Step(2), ConsensusMsg::Reduction(other.clone())).unwrap();
        assert_eq!(
            queue.drain(Round(2), Step(2)),
            vec![ConsensusMsg::Reduction(first), ConsensusMsg::Reduction(other)]
        );
    }

    #[test]
    fn step_capacity_is_bounded() {
        let rng = &mut StdRng::seed_from_u64(5);
        let mut queue = Queue::default();
        queue.advance(Round(1));
        let spam = |rng: &mut StdRng| {
            let key: SecretKey = rng.gen();
            let header = Header {
                sender: key.public(),
                round: Round(3),
                step: Step(2),
                block_hash: BlockHash::EMPTY,
            };
            ConsensusMsg::Reduction(Reduction::sign(&key, header))
        };
        for _ in 0..STEP_CAPACITY {
            queue.put(Round(3), Step(2), spam(rng)).unwrap();
        }
        assert_eq!(queue.put(Round(3), Step(2), spam(rng)), Err(Rejected::Full));
        // Other steps still have room.
        queue.put(Round(3), Step(3), spam(rng)).unwrap();
        assert_eq!(queue.len(), STEP_CAPACITY + 1);
    }
}
