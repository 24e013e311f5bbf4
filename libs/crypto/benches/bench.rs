#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use sba_consensus_crypto::bls12_381::{
    AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature,
};
use std::iter::repeat_with;

/// Cost of building and checking a committee certificate of 64 votes.
fn bench_step_votes(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let sks: Vec<SecretKey> = repeat_with(|| rng.gen()).take(64).collect();
    let pks: Vec<PublicKey> = sks.iter().map(|k| k.public()).collect();
    let msg = rng.gen::<[u8; 32]>();
    let sigs: Vec<Signature> = sks.iter().map(|k| k.sign(&msg)).collect();

    let mut group = c.benchmark_group("bls12_381");
    group.bench_function("aggregate 64 votes", |b| {
        b.iter(|| AggregateSignature::aggregate(&sigs).unwrap());
    });
    let agg = AggregateSignature::aggregate(&sigs).unwrap();
    group.bench_function("verify 64 vote certificate", |b| {
        b.iter(|| {
            let agg_pk = AggregatePublicKey::aggregate(&pks).unwrap();
            agg.verify(&msg, &agg_pk).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_step_votes);
criterion_main!(benches);
