//! Configuration of the consensus component.
use crate::{bids::BidHandle, Prover, Rpc};
use sba_consensus_roles::provisioner;
use std::{sync::Arc, time::Duration};

/// Base timeouts of the phases. Every empty outcome of a phase doubles
/// its timeout for the rest of the round, up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Generation/selection phase.
    pub generation: Duration,
    /// Both reduction phases.
    pub reduction: Duration,
    /// Agreement phase.
    pub agreement: Duration,
    /// Upper bound of every phase timeout.
    pub max: Duration,
}

impl Timeouts {
    /// No phase timeout ever grows beyond this.
    pub const CAP: Duration = Duration::from_secs(60);

    /// Checks that every base timeout is positive and at most `max`,
    /// and that `max` doesn't exceed [`Timeouts::CAP`].
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max <= Self::CAP,
            "max timeout {:?} exceeds {:?}",
            self.max,
            Self::CAP
        );
        for (name, d) in [
            ("generation", self.generation),
            ("reduction", self.reduction),
            ("agreement", self.agreement),
        ] {
            anyhow::ensure!(!d.is_zero(), "{name} timeout has to be positive");
            anyhow::ensure!(d <= self.max, "{name} timeout exceeds the max timeout");
        }
        Ok(())
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            generation: Duration::from_secs(5),
            reduction: Duration::from_secs(5),
            agreement: Duration::from_secs(5),
            max: Self::CAP,
        }
    }
}

/// Configuration of the consensus component.
#[derive(Debug)]
pub struct Config {
    /// Key of this provisioner.
    pub secret_key: provisioner::SecretKey,
    /// Committee extraction.
    pub sortition: Arc<dyn provisioner::Sortition>,
    /// Phase timeouts.
    pub timeouts: Timeouts,
    /// Deadline of a single `GetCandidate` call.
    pub get_candidate_timeout: Duration,
    /// Deadline of a single `VerifyCandidateBlock` call.
    pub verify_candidate_timeout: Duration,
    /// A proof has to score strictly above this to be proposed.
    pub score_threshold: u64,
    /// Last step a round may use. A round which would need a later step is abandoned.
    pub max_step: provisioner::Step,
    /// Candidate fetching and verification.
    pub rpc: Arc<dyn Rpc>,
    /// Blind-bid proofs and block generation.
    pub prover: Arc<dyn Prover>,
    /// Bid list used as the anonymity set of proofs.
    pub bids: BidHandle,
}
