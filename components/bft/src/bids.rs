//! Blind-bid list, owned by a single actor task.
//!
//! The list is the anonymity set of block generation proofs. Block acceptance
//! adds bids and prunes expired ones, generation asks for subsets; all of it
//! goes through a [`BidHandle`], so the list itself is never shared.
use crate::ctx;
use anyhow::Context as _;
use sba_consensus_crypto::keccak256::Keccak256;
use sba_consensus_roles::provisioner::{Round, Seed};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Maximal number of bids in a proof's anonymity set.
pub const MAX_SUBSET_LEN: usize = 10;

/// Public commitment of a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bid {
    /// Commitment to the bid.
    pub value: [u8; 32],
    /// Last round in which the bid is eligible.
    pub expiry: Round,
}

/// Set of bids, unique by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BidList(Vec<Bid>);

impl BidList {
    /// Adds `bid`. A bid with the same value is replaced.
    pub fn add(&mut self, bid: Bid) {
        match self.0.iter_mut().find(|b| b.value == bid.value) {
            Some(old) => *old = bid,
            None => self.0.push(bid),
        }
    }

    /// Drops the bids which expired before `round`.
    pub fn remove_expired(&mut self, round: Round) {
        self.0.retain(|b| b.expiry >= round);
    }

    /// Whether a bid with `value` is in the list.
    pub fn contains(&self, value: &[u8; 32]) -> bool {
        self.0.iter().any(|b| &b.value == value)
    }

    /// Number of bids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Up to `MAX_SUBSET_LEN` bids, picked deterministically from `seed`.
    pub fn subset(&self, seed: &Seed) -> Vec<Bid> {
        let mut ranked: Vec<_> = self
            .0
            .iter()
            .map(|b| (*Keccak256::concat([&seed.0[..], &b.value[..]]).as_bytes(), *b))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        ranked
            .into_iter()
            .take(MAX_SUBSET_LEN)
            .map(|(_, b)| b)
            .collect()
    }
}

impl FromIterator<Bid> for BidList {
    fn from_iter<I: IntoIterator<Item = Bid>>(iter: I) -> Self {
        let mut list = Self::default();
        for bid in iter {
            list.add(bid);
        }
        list
    }
}

#[derive(Debug)]
enum Command {
    Add(Bid),
    RemoveExpired(Round),
    Contains([u8; 32], oneshot::Sender<bool>),
    Subset(Seed, oneshot::Sender<Vec<Bid>>),
}

/// Handle to the bid list actor. The actor stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct BidHandle(mpsc::UnboundedSender<Command>);

/// Starts the actor owning `list`.
pub fn spawn(mut list: BidList) -> (BidHandle, JoinHandle<()>) {
    let (send, mut recv) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(cmd) = recv.recv().await {
            match cmd {
                Command::Add(bid) => list.add(bid),
                Command::RemoveExpired(round) => {
                    list.remove_expired(round);
                    tracing::debug!("{} bids left after pruning round {round}", list.len());
                }
                // A dropped reply channel means that the caller got canceled.
                Command::Contains(value, reply) => {
                    let _ = reply.send(list.contains(&value));
                }
                Command::Subset(seed, reply) => {
                    let _ = reply.send(list.subset(&seed));
                }
            }
        }
    });
    (BidHandle(send), task)
}

impl BidHandle {
    fn send(&self, cmd: Command) -> anyhow::Result<()> {
        self.0
            .send(cmd)
            .ok()
            .context("bid list actor has stopped")
    }

    async fn call<T>(
        &self,
        ctx: &ctx::Ctx,
        cmd: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ctx::Result<T> {
        let (send, recv) = oneshot::channel();
        self.send(cmd(send))?;
        Ok(ctx
            .wait(recv)
            .await?
            .context("bid list actor dropped the request")?)
    }

    /// Adds a bid.
    pub fn add(&self, bid: Bid) -> anyhow::Result<()> {
        self.send(Command::Add(bid))
    }

    /// Prunes the bids expired before `round`.
    pub fn remove_expired(&self, round: Round) -> anyhow::Result<()> {
        self.send(Command::RemoveExpired(round))
    }

    /// Whether a bid with `value` is in the list.
    pub async fn contains(&self, ctx: &ctx::Ctx, value: [u8; 32]) -> ctx::Result<bool> {
        self.call(ctx, |reply| Command::Contains(value, reply)).await
    }

    /// Anonymity set for a proof against `seed`.
    pub async fn subset(&self, ctx: &ctx::Ctx, seed: Seed) -> ctx::Result<Vec<Bid>> {
        self.call(ctx, |reply| Command::Subset(seed, reply)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn bid(rng: &mut impl Rng, expiry: u64) -> Bid {
        Bid {
            value: rng.gen(),
            expiry: Round(expiry),
        }
    }

    #[test]
    fn list_operations() {
        let rng = &mut StdRng::seed_from_u64(1);
        let a = bid(rng, 3);
        let b = bid(rng, 5);
        let mut list: BidList = [a, b].into_iter().collect();
        assert!(list.contains(&a.value));

        // Replacing extends the expiry.
        list.add(Bid { expiry: Round(9), ..a });
        assert_eq!(list.len(), 2);
        list.remove_expired(Round(6));
        assert!(list.contains(&a.value));
        assert!(!list.contains(&b.value));
        list.remove_expired(Round(10));
        assert!(list.is_empty());
    }

    #[test]
    fn subset_is_bounded_and_deterministic() {
        let rng = &mut StdRng::seed_from_u64(2);
        let list: BidList = (0..25).map(|_| bid(rng, 100)).collect();
        let seed = Seed(rng.gen());
        let subset = list.subset(&seed);
        assert_eq!(subset.len(), MAX_SUBSET_LEN);
        assert_eq!(subset, list.subset(&seed));
        assert!(subset.iter().all(|b| list.contains(&b.value)));
        assert_ne!(subset, list.subset(&Seed(rng.gen())));

        let small: BidList = (0..3).map(|_| bid(rng, 100)).collect();
        assert_eq!(small.subset(&seed).len(), 3);
    }

    #[tokio::test]
    async fn actor_serves_requests_in_order() {
        let rng = &mut StdRng::seed_from_u64(3);
        let ctx = &ctx::root();
        let (handle, task) = spawn(BidList::default());
        let a = bid(rng, 1);
        handle.add(a).unwrap();
        assert!(handle.contains(ctx, a.value).await.unwrap());
        handle.remove_expired(Round(2)).unwrap();
        assert!(!handle.contains(ctx, a.value).await.unwrap());
        assert_eq!(handle.subset(ctx, Seed(rng.gen())).await.unwrap(), vec![]);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stopped_actor_is_an_error() {
        let ctx = &ctx::root();
        let (handle, task) = spawn(BidList::default());
        task.abort();
        let _ = task.await;
        assert_matches!(
            handle.contains(ctx, [0; 32]).await,
            Err(ctx::Error::Internal(_))
        );
    }
}
