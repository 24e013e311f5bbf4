//! Types describing the provisioner role of the consensus engine.
//!
//! A provisioner is a staked participant. For every round and step a
//! committee is extracted from the provisioner set; committee members
//! sign votes over block hashes, and the votes of a quorum of committee
//! weight are aggregated into step votes and finally into a certificate.
//!
//! Everything in here is plain data plus pure functions over it.
//! The state machine which moves these values around lives in the bft component.

pub mod provisioner;
