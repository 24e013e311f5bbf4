//! This module contains utilities that are only meant for testing purposes.
use crate::{
    bids::{self, BidList},
    ctx, Config, Proof, Prover, Rpc, Timeouts,
};
use anyhow::Context as _;
use sba_consensus_crypto::keccak256::Keccak256;
use sba_consensus_roles::provisioner::{
    BlockHash, Candidate, PublicKey, RoundUpdate, SecretKey, Seed, Sortition, Step,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::IsTerminal as _,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

mod node;
mod run;

pub use node::*;
pub use run::*;

/// Installs a test log subscriber and, iff the current process is executed
/// under nextest in process-per-test mode, changes the behavior of the
/// process to [panic=abort]. In particular it doesn't enable [panic=abort]
/// when run via "cargo test".
pub fn abort_on_panic() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .with_ansi(std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal())
        .with_line_number(true)
        .try_init();

    // https://nexte.st/book/env-vars.html#environment-variables-nextest-sets
    let Ok(nextest) = std::env::var("NEXTEST") else {
        return;
    };
    let Ok(mode) = std::env::var("NEXTEST_EXECUTION_MODE") else {
        return;
    };
    if nextest != "1" || mode != "process-per-test" {
        return;
    }
    tracing::info!("[panic=abort] enabled");
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        std::process::abort();
    }));
}

/// Phase timeouts short enough for tests running on paused time.
pub fn timeouts() -> Timeouts {
    Timeouts {
        generation: Duration::from_secs(1),
        reduction: Duration::from_secs(1),
        agreement: Duration::from_secs(1),
        max: Duration::from_secs(60),
    }
}

/// Config of a node backed by stubs. Spawns an empty bid list actor,
/// so it has to be called within a tokio runtime.
pub fn config(
    secret_key: SecretKey,
    sortition: Arc<dyn Sortition>,
    rpc: Arc<dyn Rpc>,
    prover: Arc<dyn Prover>,
) -> Config {
    Config {
        secret_key,
        sortition,
        timeouts: timeouts(),
        get_candidate_timeout: Duration::from_secs(1),
        verify_candidate_timeout: Duration::from_secs(1),
        score_threshold: 0,
        max_step: Step(u8::MAX),
        rpc,
        prover,
        bids: bids::spawn(BidList::default()).0,
    }
}

#[derive(Debug, Default)]
struct RpcState {
    candidates: BTreeMap<BlockHash, Candidate>,
    rejected: BTreeSet<BlockHash>,
    stalled: bool,
    last_committee: Vec<PublicKey>,
}

/// In-memory candidate store. Serves whatever got inserted and
/// accepts every candidate which wasn't explicitly rejected.
#[derive(Debug, Default)]
pub struct StubRpc(Mutex<RpcState>);

impl StubRpc {
    fn lock(&self) -> MutexGuard<'_, RpcState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `block` available under its hash.
    pub fn insert(&self, block: Candidate) {
        self.lock().candidates.insert(block.hash(), block);
    }

    /// Makes verification of candidate `hash` fail.
    pub fn reject(&self, hash: BlockHash) {
        self.lock().rejected.insert(hash);
    }

    /// Makes every call block until its context is canceled.
    pub fn stall(&self) {
        self.lock().stalled = true;
    }

    /// Sets the committee returned by `get_last_committee`.
    pub fn set_last_committee(&self, committee: Vec<PublicKey>) {
        self.lock().last_committee = committee;
    }

    /// Whether candidate `hash` has been inserted.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.lock().candidates.contains_key(hash)
    }

    async fn stalled(&self, ctx: &ctx::Ctx) -> ctx::Result<()> {
        if self.lock().stalled {
            ctx.canceled().await;
            return Err(ctx::Canceled.into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Rpc for StubRpc {
    async fn get_candidate(&self, ctx: &ctx::Ctx, hash: &BlockHash) -> ctx::Result<Candidate> {
        self.stalled(ctx).await?;
        Ok(self
            .lock()
            .candidates
            .get(hash)
            .cloned()
            .with_context(|| format!("no candidate {hash:?}"))?)
    }

    async fn verify_candidate_block(&self, ctx: &ctx::Ctx, block: &Candidate) -> ctx::Result<()> {
        self.stalled(ctx).await?;
        let hash = block.hash();
        if self.lock().rejected.contains(&hash) {
            return Err(anyhow::anyhow!("candidate {hash:?} rejected").into());
        }
        Ok(())
    }

    async fn get_last_committee(&self, ctx: &ctx::Ctx) -> ctx::Result<Vec<PublicKey>> {
        self.stalled(ctx).await?;
        Ok(self.lock().last_committee.clone())
    }
}

/// Prover deriving the score of node `id` from the round seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubProver {
    /// Identifies the node, so that different nodes produce different scores and blocks.
    pub id: u64,
    /// Whether the node holds a bid at all.
    pub eligible: bool,
    /// Overrides the derived score.
    pub score: Option<u64>,
}

impl StubProver {
    /// Eligible prover with a derived score.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            eligible: true,
            score: None,
        }
    }

    /// Prover which never proposes.
    pub fn ineligible(id: u64) -> Self {
        Self {
            eligible: false,
            ..Self::new(id)
        }
    }
}

#[async_trait::async_trait]
impl Prover for StubProver {
    async fn prove(
        &self,
        _ctx: &ctx::Ctx,
        seed: &Seed,
        _bids: &[bids::Bid],
    ) -> ctx::Result<Option<Proof>> {
        if !self.eligible {
            return Ok(None);
        }
        let hash = Keccak256::concat([&seed.0[..], &self.id.to_le_bytes()[..]]);
        let mut head = [0; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        Ok(Some(Proof {
            score: self.score.unwrap_or(u64::from_le_bytes(head)),
            proof: hash.as_bytes().to_vec(),
        }))
    }

    async fn generate_block(
        &self,
        _ctx: &ctx::Ctx,
        ru: &RoundUpdate,
        coinbase: Vec<PublicKey>,
    ) -> ctx::Result<Candidate> {
        Ok(Candidate {
            round: ru.round,
            prev_hash: ru.prev_hash,
            seed: ru.seed,
            payload: self.id.to_le_bytes().to_vec(),
            coinbase,
        })
    }
}
