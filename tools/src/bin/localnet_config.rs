//! This tool constructs a localnet config with fresh provisioner keys.
use anyhow::Context as _;
use clap::Parser;
use sba_consensus_tools::{encode_json, AppConfig};
use std::{
    fs::{self, Permissions},
    net::{Ipv4Addr, SocketAddr},
    os::unix::fs::PermissionsExt,
    path::PathBuf,
};

/// Command line arguments.
#[derive(Debug, Parser)]
struct Args {
    /// Number of provisioners.
    #[arg(long, default_value_t = 4)]
    nodes: usize,
    /// Committee seats per step.
    #[arg(long, default_value_t = 64)]
    committee_size: usize,
    /// Rounds to finalize before exiting. Runs until interrupted if not set.
    #[arg(long)]
    rounds: Option<usize>,
    /// TCP port to serve metrics for scraping.
    #[arg(long)]
    metrics_server_port: Option<u16>,
    /// Path of the config file to create.
    #[arg(long, default_value = "config.json")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    anyhow::ensure!(args.nodes > 0, "at least 1 provisioner has to be configured");
    let rng = &mut rand::thread_rng();
    let mut cfg = AppConfig::generate(rng, args.nodes);
    cfg.committee_size = args.committee_size;
    cfg.rounds = args.rounds;
    cfg.metrics_server_addr = args
        .metrics_server_port
        .map(|port| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port));
    cfg.network().context("generated config is invalid")?;

    fs::write(&args.output, encode_json(&cfg)?)
        .with_context(|| format!("fs::write({:?})", args.output))?;
    // The config holds secret keys.
    fs::set_permissions(&args.output, Permissions::from_mode(0o600))
        .context("fs::set_permissions()")?;
    Ok(())
}
