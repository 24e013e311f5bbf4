use super::Keccak256;

fn h(s: &str) -> [u8; 32] {
    hex::decode(s).unwrap().try_into().unwrap()
}

#[test]
fn known_vectors() {
    let vectors: [(&[u8], &str); 3] = [
        (b"testing", "5f16f4c7f149ac4f9510d9cf8cf384038ad348b3bcdc01915f95de12df9d1b02"),
        (b"", "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"),
        (&[0x12, 0x34, 0x56], "6adf031833174bbe4c85eafe59ddb54e6584648c2c962c6f94791ab49caa0ad4"),
    ];
    for (input, want) in vectors {
        assert_eq!(Keccak256::new(input).as_bytes(), &h(want));
    }
}

#[test]
fn concat_matches_single_buffer() {
    let parts: [&[u8]; 3] = [b"round", &[1, 2, 3], b"step"];
    assert_eq!(Keccak256::concat(parts), Keccak256::new(&parts.concat()));
}
