use crate::provisioner::{testonly::Setup, wire, *};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sba_consensus_crypto::ByteFmt as _;
use test_casing::test_casing;

#[test]
fn reduction_wire_layout() {
    let rng = &mut StdRng::seed_from_u64(1);
    let setup = Setup::new(rng, 1);
    let hash: BlockHash = rng.gen();
    let vote = setup.reduction(0, Round(0x0102), Step(2), hash);

    let raw = wire::encode(&vote);
    assert_eq!(raw.len(), 8 + 1 + 32 + 48 + 96);
    assert_eq!(raw[..8], 0x0102_u64.to_le_bytes());
    assert_eq!(raw[8], 2);
    assert_eq!(raw[9..41], hash.0);
    assert_eq!(raw[41..89], setup.keys[0].public().encode());
    assert_eq!(raw[89..], vote.signature.encode());
    assert_eq!(wire::decode::<Reduction>(&raw).unwrap(), vote);
}

#[test]
fn consensus_msg_is_topic_tagged() {
    let rng = &mut StdRng::seed_from_u64(2);
    let setup = Setup::new(rng, 1);
    let msg = ConsensusMsg::Reduction(setup.reduction(0, Round(1), Step(2), rng.gen()));
    let raw = wire::encode(&msg);
    assert_eq!(raw[0], Topic::Reduction as u8);
    assert_eq!(wire::decode::<ConsensusMsg>(&raw).unwrap(), msg);

    let mut bad = raw.clone();
    bad[0] = 0x7f;
    assert_matches!(
        wire::decode::<ConsensusMsg>(&bad),
        Err(wire::Error::UnknownTopic(0x7f))
    );
    assert_matches!(
        wire::decode::<ConsensusMsg>(&raw[..raw.len() - 1]),
        Err(wire::Error::EndOfBuffer)
    );
}

#[test]
fn agreement_and_proposals_decode() {
    let rng = &mut StdRng::seed_from_u64(3);
    let setup = Setup::new(rng, 4);
    let hash: BlockHash = rng.gen();
    let key = &setup.keys[0];
    let header = Header {
        round: Round(5),
        step: Step(4),
        block_hash: hash,
        sender: key.public(),
    };
    let votes = [
        setup.step_votes(Round(5), Step(2), hash, 0..3),
        StepVotes::empty(),
    ];
    let block: Candidate = rng.gen();
    let msgs = [
        ConsensusMsg::Agreement(Agreement::sign(key, header.clone(), votes)),
        ConsensusMsg::Score(Score::sign(key, header.clone(), 77, vec![1, 2, 3], rng.gen())),
        ConsensusMsg::Candidate(CandidateMsg::sign(key, header, block)),
    ];
    for msg in msgs {
        let got = wire::decode::<ConsensusMsg>(&wire::encode(&msg)).unwrap();
        assert_eq!(got, msg);
        msg.signature()
            .verify(&msg.signable(), &msg.header().sender)
            .unwrap();
    }
}

#[test]
fn agreement_signature_is_not_a_reduction_signature() {
    let rng = &mut StdRng::seed_from_u64(4);
    let setup = Setup::new(rng, 1);
    let hash: BlockHash = rng.gen();
    let red = setup.reduction(0, Round(1), Step(4), hash);
    let agr = Agreement::sign(
        &setup.keys[0],
        red.header.clone(),
        [StepVotes::empty(), StepVotes::empty()],
    );
    assert!(agr.signature.verify(&red.signable(), &red.header.sender).is_err());
}

#[test]
fn candidate_msg_header_carries_block_hash() {
    let rng = &mut StdRng::seed_from_u64(5);
    let setup = Setup::new(rng, 1);
    let block: Candidate = rng.gen();
    let msg = CandidateMsg::sign(
        &setup.keys[0],
        Header {
            round: block.round,
            step: Step::FIRST,
            block_hash: BlockHash::EMPTY,
            sender: setup.keys[0].public(),
        },
        block.clone(),
    );
    assert_eq!(msg.header.block_hash, block.hash());
    assert!(!block.hash().is_empty());
}

#[test_casing(6, [
    (Round(1), Step(1), Position::Before),
    (Round(1), Step(2), Position::Before),
    (Round(2), Step(1), Position::Before),
    (Round(2), Step(2), Position::Same),
    (Round(2), Step(3), Position::After),
    (Round(3), Step(1), Position::After),
])]
#[test]
fn header_position(round: Round, step: Step, want: Position) {
    let rng = &mut StdRng::seed_from_u64(6);
    let header = Header {
        round,
        step,
        block_hash: rng.gen(),
        sender: rng.gen(),
    };
    assert_eq!(header.compare(Round(2), Step(2)), want);
}

#[test_casing(8, [(1, 1), (3, 2), (10, 7), (25, 16), (50, 32), (64, 41), (100, 64), (101, 65)])]
#[test]
fn quorum_threshold_reaches_64_percent(total: u64, want: u64) {
    assert_eq!(quorum_threshold(total), want);
    assert!(100 * want >= 64 * total);
    assert!(100 * (want - 1) < 64 * total);
}

#[test]
fn quorum_threshold_does_not_overflow() {
    assert!(quorum_threshold(u64::MAX) < u64::MAX);
}

#[test]
fn step_votes_verify() {
    let rng = &mut StdRng::seed_from_u64(7);
    let setup = Setup::new(rng, 10);
    let committee = setup.committee();
    let hash: BlockHash = rng.gen();
    let (round, step) = (Round(3), Step(2));

    let votes = setup.step_votes(round, step, hash, 0..7);
    votes.verify(round, step, &committee).unwrap();

    // Same votes, checked for a different step.
    assert_matches!(
        votes.verify(round, Step(3), &committee),
        Err(StepVotesVerifyError::BadSignature(_))
    );

    let votes = setup.step_votes(round, step, hash, 0..6);
    assert_matches!(
        votes.verify(round, step, &committee),
        Err(StepVotesVerifyError::NotEnoughWeight { got: 6, want: 7 })
    );

    // Bitmap claims a signer whose signature isn't in the aggregate.
    let mut votes = setup.step_votes(round, step, hash, 0..7);
    votes.signers.insert(9);
    assert_matches!(
        votes.verify(round, step, &committee),
        Err(StepVotesVerifyError::BadSignature(_))
    );

    let mut votes = setup.step_votes(round, step, hash, 0..7);
    votes.signers.0.push(false);
    assert_matches!(
        votes.verify(round, step, &committee),
        Err(StepVotesVerifyError::BadSignersSet { got: 11, want: 10 })
    );

    assert_matches!(
        StepVotes::empty().verify(round, step, &committee),
        Err(StepVotesVerifyError::Empty)
    );
}

#[test]
fn empty_step_votes_on_the_wire() {
    let raw = wire::encode(&StepVotes::empty());
    assert_eq!(raw.len(), 32 + 2 + 96);
    assert!(raw.iter().all(|b| *b == 0));
    let got: StepVotes = wire::decode(&raw).unwrap();
    assert!(got.is_empty());
}

#[test]
fn signers_padding_bits_rejected() {
    let mut bits = Signers::new(3);
    bits.insert(1);
    let mut raw = wire::encode(&bits);
    assert_eq!(wire::decode::<Signers>(&raw).unwrap(), bits);
    // Bit 7 of the first byte lies beyond the 3 committee members.
    raw[2] |= 1;
    assert_matches!(
        wire::decode::<Signers>(&raw),
        Err(wire::Error::Invalid("signers", _))
    );
}

#[test]
fn score_selection_order() {
    let rng = &mut StdRng::seed_from_u64(8);
    let setup = Setup::new(rng, 1);
    let key = &setup.keys[0];
    let score = |score, hash| {
        let header = Header {
            round: Round(1),
            step: Step(1),
            block_hash: BlockHash(hash),
            sender: key.public(),
        };
        Score::sign(key, header, score, vec![], Seed([0; 32]))
    };
    assert!(score(2, [9; 32]).beats(&score(1, [1; 32])));
    assert!(score(2, [1; 32]).beats(&score(2, [9; 32])));
    assert!(!score(2, [9; 32]).beats(&score(2, [9; 32])));
}

#[test]
fn committee_subset_follows_signers() {
    let rng = &mut StdRng::seed_from_u64(9);
    let setup = Setup::new(rng, 5);
    let committee = setup.committee();
    let mut signers = Signers::new(5);
    signers.insert(1);
    signers.insert(3);
    let got: Vec<_> = committee.subset(&signers).cloned().collect();
    assert_eq!(got, vec![setup.keys[1].public(), setup.keys[3].public()]);
    assert_eq!(signers.weight(&committee), 2);
}
