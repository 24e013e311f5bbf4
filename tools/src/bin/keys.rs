//! This tool generates a provisioner key pair and prints it to stdout.
#![allow(clippy::print_stdout)]

use sba_consensus_crypto::TextFmt as _;
use sba_consensus_roles::provisioner;

/// This tool generates a provisioner key pair and prints it to stdout.
fn main() {
    let key = provisioner::SecretKey::generate();
    println!("keys:");
    println!("{}", key.encode());
    println!("{}", key.public().encode());
}
