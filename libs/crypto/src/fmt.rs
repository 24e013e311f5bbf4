//! Byte and text encodings of cryptographic material.
use anyhow::Context as _;

/// Cursor over a human-readable representation, used by `TextFmt::decode`.
/// Remembers the full input so that parse errors can point at the
/// part which has already been consumed.
pub struct Text<'a> {
    full: &'a str,
    rest: &'a str,
}

impl<'a> Text<'a> {
    /// Wraps `s` for parsing.
    pub fn new(s: &'a str) -> Self {
        Self { full: s, rest: s }
    }

    fn consumed(&self) -> &'a str {
        // `rest` is always a suffix of `full`, so the split lands on a char boundary.
        &self.full[..self.full.len() - self.rest.len()]
    }

    /// Consumes the expected `prefix`, failing if the input doesn't start with it.
    pub fn strip(mut self, prefix: &str) -> anyhow::Result<Self> {
        let Some(rest) = self.rest.strip_prefix(prefix) else {
            anyhow::bail!("{}: expected {prefix:?}, got {:?}", self.consumed(), self.rest);
        };
        self.rest = rest;
        Ok(self)
    }

    /// Interprets the remaining input as hex and decodes it via `ByteFmt`.
    pub fn decode_hex<T: ByteFmt>(self) -> anyhow::Result<T> {
        let raw = hex::decode(self.rest).with_context(|| self.consumed().to_owned())?;
        ByteFmt::decode(&raw).with_context(|| self.consumed().to_owned())
    }

    /// `t.decode::<T>()` is `<T as TextFmt>::decode(t)`.
    pub fn decode<T: TextFmt>(self) -> anyhow::Result<T> {
        TextFmt::decode(self)
    }
}

/// Human-readable encoding, used for keys in config files.
///
/// `decode(encode(x)) == x` must hold, and encodings of different
/// key kinds must not be accepted for one another. This is what the
/// type prefixes (e.g. `provisioner:public:bls12_381:`) are for.
pub trait TextFmt: Sized {
    /// Parses the text representation.
    fn decode(text: Text) -> anyhow::Result<Self>;
    /// Produces the text representation.
    fn encode(&self) -> String;
}

/// Canonical binary encoding of a cryptographic object.
///
/// The encoding is part of the signed payload of consensus messages,
/// so it has to be stable across releases: `decode(b).encode() == b`.
pub trait ByteFmt: Sized {
    /// Parses the binary representation.
    fn decode(bytes: &[u8]) -> anyhow::Result<Self>;
    /// Produces the binary representation.
    fn encode(&self) -> Vec<u8>;
}

impl TextFmt for std::net::SocketAddr {
    fn decode(text: Text) -> anyhow::Result<Self> {
        Ok(text.rest.parse()?)
    }
    fn encode(&self) -> String {
        self.to_string()
    }
}
