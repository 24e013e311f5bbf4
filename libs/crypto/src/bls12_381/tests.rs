use super::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn keys(rng: &mut StdRng, n: usize) -> Vec<SecretKey> {
    (0..n).map(|_| rng.gen()).collect()
}

#[test]
fn signature_smoke() {
    let rng = &mut StdRng::seed_from_u64(29483920);
    let sk: SecretKey = rng.gen();
    let msg: [u8; 32] = rng.gen();
    sk.sign(&msg).verify(&msg, &sk.public()).unwrap();
}

#[test]
fn signature_wrong_key() {
    let rng = &mut StdRng::seed_from_u64(29483920);
    let [sk1, sk2] = [rng.gen::<SecretKey>(), rng.gen()];
    let msg: [u8; 32] = rng.gen();
    assert!(sk1.sign(&msg).verify(&msg, &sk2.public()).is_err());
}

#[test]
fn infinity_public_key_rejected() {
    assert!(PublicKey::decode(&INFINITY_PUBLIC_KEY).is_err());
}

#[test]
fn encoding_lengths() {
    let rng = &mut StdRng::seed_from_u64(1);
    let sk: SecretKey = rng.gen();
    assert_eq!(sk.public().encode().len(), PUBLIC_KEY_BYTES_LEN);
    assert_eq!(sk.sign(b"vote").encode().len(), SIGNATURE_BYTES_LEN);
    let sk2 = SecretKey::decode(&sk.encode()).unwrap();
    assert_eq!(sk.public(), sk2.public());
}

#[test]
fn aggregate_signature_of_subset() {
    let rng = &mut StdRng::seed_from_u64(29483920);
    let sks = keys(rng, 7);
    let msg: [u8; 32] = rng.gen();
    let subset = &sks[2..6];

    let sigs: Vec<_> = subset.iter().map(|k| k.sign(&msg)).collect();
    let agg_sig = AggregateSignature::aggregate(&sigs).unwrap();
    let pks: Vec<_> = subset.iter().map(|k| k.public()).collect();
    let agg_pk = AggregatePublicKey::aggregate(&pks).unwrap();
    agg_sig.verify(&msg, &agg_pk).unwrap();

    // Incremental aggregation gives the same result.
    let mut inc = AggregateSignature::aggregate([&sigs[0]]).unwrap();
    for sig in &sigs[1..] {
        inc.add(sig).unwrap();
    }
    assert_eq!(inc, agg_sig);

    // A key set which differs from the signers doesn't verify.
    let all: Vec<_> = sks.iter().map(|k| k.public()).collect();
    let agg_all = AggregatePublicKey::aggregate(&all).unwrap();
    assert!(agg_sig.verify(&msg, &agg_all).is_err());
}

#[test]
fn aggregate_of_nothing_fails() {
    assert!(AggregateSignature::aggregate([]).is_err());
    assert!(AggregatePublicKey::aggregate([]).is_err());
}
