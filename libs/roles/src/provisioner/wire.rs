//! Fixed-layout binary encoding of consensus messages.
//!
//! All integers are little-endian. Keys and signatures use their compressed
//! encodings (48 and 96 bytes). Variable-length fields are prefixed with
//! their length and bounded, so that a decoder never allocates more than
//! a fixed amount for a single field.
use bytes::{Buf, BufMut};
use super::{PublicKey, Signature};
use sba_consensus_crypto::{
    bls12_381::{PUBLIC_KEY_BYTES_LEN, SIGNATURE_BYTES_LEN},
    ByteFmt,
};

/// Maximal length of a variable-length byte field.
pub const MAX_BYTES_LEN: usize = 1 << 20;

/// Maximal number of elements of a variable-length list.
pub const MAX_LIST_LEN: usize = 1 << 12;

/// Decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input ended in the middle of a value.
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    /// Input continues after the value.
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    /// Length prefix above the allowed maximum.
    #[error("length exceeded: {0} > {1}")]
    LengthExceeded(usize, usize),
    /// Unknown message topic.
    #[error("unknown topic {0:#04x}")]
    UnknownTopic(u8),
    /// Field bytes don't form a valid value.
    #[error("invalid {0}: {1:#}")]
    Invalid(&'static str, anyhow::Error),
}

/// Values which can be written to a buffer.
pub trait Write {
    /// Appends the encoding of `self` to `buf`.
    fn write(&self, buf: &mut impl BufMut);
}

/// Values which can be read from a buffer.
pub trait Read: Sized {
    /// Consumes the encoding of a value from the front of `buf`.
    fn read(buf: &mut impl Buf) -> Result<Self, Error>;
}

/// Encodes `v` into a fresh buffer.
pub fn encode<T: Write>(v: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    v.write(&mut buf);
    buf
}

/// Decodes a value which has to span the whole of `bytes`.
pub fn decode<T: Read>(mut bytes: &[u8]) -> Result<T, Error> {
    let v = T::read(&mut bytes)?;
    if !bytes.is_empty() {
        return Err(Error::ExtraData(bytes.len()));
    }
    Ok(v)
}

fn ensure(buf: &impl Buf, n: usize) -> Result<(), Error> {
    if buf.remaining() < n {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

/// Reads exactly `N` bytes.
pub fn read_array<const N: usize>(buf: &mut impl Buf) -> Result<[u8; N], Error> {
    ensure(buf, N)?;
    let mut raw = [0; N];
    buf.copy_to_slice(&mut raw);
    Ok(raw)
}

/// Reads exactly `n` bytes and decodes them via `ByteFmt`.
pub(crate) fn read_fixed<T: ByteFmt>(
    buf: &mut impl Buf,
    n: usize,
    what: &'static str,
) -> Result<T, Error> {
    ensure(buf, n)?;
    let raw = buf.copy_to_bytes(n);
    T::decode(&raw).map_err(|err| Error::Invalid(what, err))
}

impl Write for u8 {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(*self);
    }
}

impl Read for u8 {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        ensure(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl Write for u64 {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(*self);
    }
}

impl Read for u64 {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        ensure(buf, 8)?;
        Ok(buf.get_u64_le())
    }
}

impl Write for Vec<u8> {
    fn write(&self, buf: &mut impl BufMut) {
        // Writers never produce fields above the maximum, readers enforce it.
        buf.put_u32_le(self.len() as u32);
        buf.put_slice(self);
    }
}

impl Read for Vec<u8> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        ensure(buf, 4)?;
        let len = buf.get_u32_le() as usize;
        if len > MAX_BYTES_LEN {
            return Err(Error::LengthExceeded(len, MAX_BYTES_LEN));
        }
        ensure(buf, len)?;
        Ok(buf.copy_to_bytes(len).to_vec())
    }
}

/// Writes a list with a `u16` element count.
pub(crate) fn write_list<T: Write>(items: &[T], buf: &mut impl BufMut) {
    buf.put_u16_le(items.len() as u16);
    for item in items {
        item.write(buf);
    }
}

/// Reads a list written by `write_list`.
pub(crate) fn read_list<T: Read>(buf: &mut impl Buf) -> Result<Vec<T>, Error> {
    ensure(buf, 2)?;
    let len = usize::from(buf.get_u16_le());
    if len > MAX_LIST_LEN {
        return Err(Error::LengthExceeded(len, MAX_LIST_LEN));
    }
    (0..len).map(|_| T::read(buf)).collect()
}

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.encode());
    }
}

impl Read for PublicKey {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        read_fixed(buf, PUBLIC_KEY_BYTES_LEN, "public key")
    }
}

impl Write for Signature {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.encode());
    }
}

impl Read for Signature {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        read_fixed(buf, SIGNATURE_BYTES_LEN, "signature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn integers_are_little_endian() {
        assert_eq!(encode(&0x0102_0304_0506_0708_u64), [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn truncated_input() {
        assert_matches!(decode::<u64>(&[1, 2, 3]), Err(Error::EndOfBuffer));
        let mut raw = encode(&vec![1_u8, 2, 3]);
        raw.pop();
        assert_matches!(decode::<Vec<u8>>(&raw), Err(Error::EndOfBuffer));
    }

    #[test]
    fn trailing_bytes() {
        assert_matches!(decode::<u8>(&[1, 2]), Err(Error::ExtraData(1)));
    }

    #[test]
    fn oversized_length_prefix() {
        let mut raw = vec![];
        raw.put_u32_le(u32::MAX);
        assert_matches!(decode::<Vec<u8>>(&raw), Err(Error::LengthExceeded(..)));
    }
}
