use crate::{
    ctx,
    testonly::{self, Behavior, Network, StubProver, StubRpc},
    Config, OutputMessage,
};
use assert_matches::assert_matches;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sba_consensus_roles::provisioner::{
    quorum_threshold, testonly::Setup, ConsensusMsg, Extraction, Round, RoundUpdate, Step,
};
use std::{sync::Arc, time::Duration};
use test_casing::test_casing;
use tokio::{sync::mpsc, task::JoinHandle};

/// A component under test, seen from its channels.
struct Harness {
    rounds: mpsc::UnboundedSender<RoundUpdate>,
    inbound: mpsc::UnboundedSender<ConsensusMsg>,
    out: mpsc::UnboundedReceiver<OutputMessage>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn spawn(ctx: &ctx::Ctx, cfg: Config) -> Self {
        let (rounds, rounds_recv) = mpsc::unbounded_channel();
        let (inbound, inbound_recv) = mpsc::unbounded_channel();
        let (out_send, out) = mpsc::unbounded_channel();
        let ctx = ctx.clone();
        let task =
            tokio::spawn(async move { cfg.run(&ctx, rounds_recv, inbound_recv, out_send).await });
        Self {
            rounds,
            inbound,
            out,
            task,
        }
    }

    /// Outputs published so far.
    fn outputs(&mut self) -> Vec<OutputMessage> {
        drain(&mut self.out)
    }

    /// Closes the round updates, waits for the component to stop
    /// and returns the outputs it published since the last `outputs()`.
    async fn join(self) -> Vec<OutputMessage> {
        let Self {
            rounds,
            mut out,
            task,
            ..
        } = self;
        drop(rounds);
        task.await.unwrap().unwrap();
        drain(&mut out)
    }
}

fn drain(out: &mut mpsc::UnboundedReceiver<OutputMessage>) -> Vec<OutputMessage> {
    let mut msgs = vec![];
    while let Ok(msg) = out.try_recv() {
        msgs.push(msg);
    }
    msgs
}

fn round_update(setup: &Setup, rng: &mut StdRng, round: u64) -> RoundUpdate {
    RoundUpdate {
        round: Round(round),
        ..setup.round_update(rng, setup.keys.len())
    }
}

#[tokio::test(start_paused = true)]
async fn single_provisioner_finalizes() {
    testonly::abort_on_panic();
    let ctx = &ctx::root();
    let rng = &mut StdRng::seed_from_u64(1);
    let setup = Setup::new(rng, 1);
    let cfg = testonly::config(
        setup.keys[0].clone(),
        Arc::new(setup.fixed_sortition()),
        Arc::new(StubRpc::default()),
        Arc::new(StubProver::new(0)),
    );
    let h = Harness::spawn(ctx, cfg);
    let ru = round_update(&setup, rng, 1);
    h.rounds.send(ru.clone()).unwrap();
    // No more rounds: the component stops once the current one is decided.
    let outputs = h.join().await;
    assert_matches!(&outputs[..], [
        OutputMessage::RoundStarted(Round(1)),
        OutputMessage::Gossip(ConsensusMsg::Candidate(block)),
        OutputMessage::Gossip(ConsensusMsg::Score(_)),
        OutputMessage::Gossip(ConsensusMsg::Reduction(first)),
        OutputMessage::Gossip(ConsensusMsg::Reduction(second)),
        OutputMessage::Gossip(ConsensusMsg::Agreement(_)),
        OutputMessage::Certificate(cert),
    ] => {
        let hash = block.block.hash();
        assert_eq!(block.block.prev_hash, ru.prev_hash);
        assert_eq!((first.header.step, first.header.block_hash), (Step(2), hash));
        assert_eq!((second.header.step, second.header.block_hash), (Step(3), hash));
        assert_eq!((cert.round, cert.step, cert.block_hash), (Round(1), Step(4), hash));
        let committee = setup.committee();
        cert.first.verify(Round(1), Step(2), &committee).unwrap();
        cert.second.verify(Round(1), Step(3), &committee).unwrap();
    });
}

#[tokio::test(start_paused = true)]
async fn newer_round_replaces_current() {
    testonly::abort_on_panic();
    let ctx = &ctx::root();
    let rng = &mut StdRng::seed_from_u64(2);
    // Nobody else votes, so round 1 can't end on its own.
    let setup = Setup::new(rng, 4);
    let cfg = testonly::config(
        setup.keys[0].clone(),
        Arc::new(setup.fixed_sortition()),
        Arc::new(StubRpc::default()),
        Arc::new(StubProver::ineligible(0)),
    );
    let mut h = Harness::spawn(ctx, cfg);
    h.rounds.send(round_update(&setup, rng, 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    h.rounds.send(round_update(&setup, rng, 2)).unwrap();
    // Stale updates are ignored.
    h.rounds.send(round_update(&setup, rng, 1)).unwrap();
    h.rounds.send(round_update(&setup, rng, 2)).unwrap();
    // Votes of the replaced round are dropped.
    h.inbound
        .send(setup.reduction(1, Round(1), Step(2), rng.gen()).into())
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let outputs = h.outputs();
    let started = outputs
        .iter()
        .position(|m| m == &OutputMessage::RoundStarted(Round(2)))
        .unwrap();
    assert_eq!(outputs[0], OutputMessage::RoundStarted(Round(1)));
    // Round 1 got as far as voting in the first reduction.
    assert!(outputs[..started].iter().any(|m| matches!(
        m,
        OutputMessage::Gossip(ConsensusMsg::Reduction(v)) if v.header.round == Round(1)
    )));
    for msg in &outputs[started + 1..] {
        assert_matches!(msg, OutputMessage::Gossip(msg) => {
            assert_eq!(msg.header().round, Round(2));
        });
    }
    assert!(outputs.len() > started + 1);

    ctx.cancel();
    h.join().await;
}

#[tokio::test(start_paused = true)]
async fn runs_out_of_steps() {
    testonly::abort_on_panic();
    let ctx = &ctx::root();
    let rng = &mut StdRng::seed_from_u64(3);
    let setup = Setup::new(rng, 4);
    let mut cfg = testonly::config(
        setup.keys[0].clone(),
        Arc::new(setup.fixed_sortition()),
        Arc::new(StubRpc::default()),
        Arc::new(StubProver::ineligible(0)),
    );
    // Room for two iterations.
    cfg.max_step = Step(9);
    let h = Harness::spawn(ctx, cfg);
    h.rounds.send(round_update(&setup, rng, 1)).unwrap();
    let outputs = h.join().await;
    let steps: Vec<_> = outputs
        .iter()
        .filter_map(|m| match m {
            OutputMessage::Gossip(msg) => Some(msg.header().step),
            _ => None,
        })
        .collect();
    // Empty reductions skip the agreement vote.
    assert_eq!(steps, [Step(2), Step(3), Step(6), Step(7)]);
    assert!(!outputs
        .iter()
        .any(|m| matches!(m, OutputMessage::Certificate(_))));
}

const NODES: usize = 11;

async fn run_network(behavior: Behavior) {
    testonly::abort_on_panic();
    let ctx = &ctx::root();
    let rng = &mut StdRng::seed_from_u64(4);
    let setup = Setup::new(rng, NODES);
    let mut behaviors = vec![behavior; NODES];
    // Given equal weights, a quorum of honest nodes is enough.
    let honest = quorum_threshold(NODES as u64) as usize;
    for b in &mut behaviors[..honest] {
        *b = Behavior::Honest;
    }
    let certs = Network::new(&setup, &behaviors).run(ctx, 5).await.unwrap();

    let committee = setup.committee();
    for (i, cert) in certs.iter().enumerate() {
        assert_eq!(cert.round, Round(i as u64 + 1));
        let first = Step(cert.step.0 - 2);
        cert.first.verify(cert.round, first, &committee).unwrap();
        cert.second.verify(cert.round, Step(cert.step.0 - 1), &committee).unwrap();
        assert_eq!(cert.first.block_hash, cert.block_hash);
    }
}

#[test_casing(3, [Behavior::Honest, Behavior::HonestNotProposing, Behavior::Offline])]
#[tokio::test(start_paused = true)]
async fn network_finalizes(behavior: Behavior) {
    run_network(behavior).await;
}

#[tokio::test(start_paused = true)]
async fn network_with_extraction() {
    testonly::abort_on_panic();
    let ctx = &ctx::root();
    let rng = &mut StdRng::seed_from_u64(5);
    let setup = Setup::new_with_stakes(rng, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let mut network = Network::new(&setup, &[Behavior::Honest; 8]);
    network.sortition = Arc::new(Extraction);
    network.committee_size = 64;
    let certs = network.run(ctx, 3).await.unwrap();
    assert_eq!(certs.len(), 3);
    // Every round extends the block certified in the previous one.
    assert!(certs.windows(2).all(|w| w[0].block_hash != w[1].block_hash));
}
