//! Consensus messages.

mod certificate;
mod header;
mod msg;
mod proposal;
mod step_votes;
#[cfg(test)]
mod tests;
mod vote;

pub use self::{certificate::*, header::*, msg::*, proposal::*, step_votes::*, vote::*};
