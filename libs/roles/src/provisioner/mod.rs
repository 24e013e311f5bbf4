//! Provisioner role: keys, committees and consensus messages.

mod committee;
mod keys;
mod messages;
mod sortition;
pub mod testonly;
pub mod wire;

pub use self::{committee::*, keys::*, messages::*, sortition::*};
