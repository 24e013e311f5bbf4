//! Envelope over all consensus messages.
use crate::provisioner::{
    wire::{self, Read, Write},
    Agreement, CandidateMsg, Header, Reduction, Score, Signature,
};
use bytes::{Buf, BufMut};

/// Gossip topic of a message. Encoded as the first byte on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Topic {
    /// `Score`.
    Score = 1,
    /// `CandidateMsg`.
    Candidate = 2,
    /// `Reduction`.
    Reduction = 3,
    /// `Agreement`.
    Agreement = 4,
}

impl TryFrom<u8> for Topic {
    type Error = wire::Error;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        Ok(match b {
            1 => Self::Score,
            2 => Self::Candidate,
            3 => Self::Reduction,
            4 => Self::Agreement,
            b => return Err(wire::Error::UnknownTopic(b)),
        })
    }
}

/// Consensus message of any topic. Every variant carries a header and
/// the author's signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusMsg {
    /// Selection proposal.
    Score(Score),
    /// Candidate block.
    Candidate(CandidateMsg),
    /// Reduction vote.
    Reduction(Reduction),
    /// Agreement vote.
    Agreement(Agreement),
}

impl ConsensusMsg {
    /// Topic of the message.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Score(_) => Topic::Score,
            Self::Candidate(_) => Topic::Candidate,
            Self::Reduction(_) => Topic::Reduction,
            Self::Agreement(_) => Topic::Agreement,
        }
    }

    /// Header of the message.
    pub fn header(&self) -> &Header {
        match self {
            Self::Score(m) => &m.header,
            Self::Candidate(m) => &m.header,
            Self::Reduction(m) => &m.header,
            Self::Agreement(m) => &m.header,
        }
    }

    /// Author's signature.
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Score(m) => &m.signature,
            Self::Candidate(m) => &m.signature,
            Self::Reduction(m) => &m.signature,
            Self::Agreement(m) => &m.signature,
        }
    }

    /// Bytes the author signed.
    pub fn signable(&self) -> Vec<u8> {
        match self {
            Self::Score(m) => m.signable().to_vec(),
            Self::Candidate(m) => m.header.signable().to_vec(),
            Self::Reduction(m) => m.signable().to_vec(),
            Self::Agreement(m) => m.signable().to_vec(),
        }
    }
}

impl From<Score> for ConsensusMsg {
    fn from(m: Score) -> Self {
        Self::Score(m)
    }
}

impl From<CandidateMsg> for ConsensusMsg {
    fn from(m: CandidateMsg) -> Self {
        Self::Candidate(m)
    }
}

impl From<Reduction> for ConsensusMsg {
    fn from(m: Reduction) -> Self {
        Self::Reduction(m)
    }
}

impl From<Agreement> for ConsensusMsg {
    fn from(m: Agreement) -> Self {
        Self::Agreement(m)
    }
}

impl Write for ConsensusMsg {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.topic() as u8);
        match self {
            Self::Score(m) => m.write(buf),
            Self::Candidate(m) => m.write(buf),
            Self::Reduction(m) => m.write(buf),
            Self::Agreement(m) => m.write(buf),
        }
    }
}

impl Read for ConsensusMsg {
    fn read(buf: &mut impl Buf) -> Result<Self, wire::Error> {
        Ok(match Topic::try_from(u8::read(buf)?)? {
            Topic::Score => Self::Score(Score::read(buf)?),
            Topic::Candidate => Self::Candidate(CandidateMsg::read(buf)?),
            Topic::Reduction => Self::Reduction(Reduction::read(buf)?),
            Topic::Agreement => Self::Agreement(Agreement::read(buf)?),
        })
    }
}
