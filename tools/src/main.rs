//! Main binary of the localnet. It reads the configuration, starts one consensus
//! component per configured provisioner, connects them through an in-process
//! gossip hub and runs rounds until enough of them are finalized.
use anyhow::Context as _;
use clap::Parser;
use sba_consensus_bft::ctx;
use sba_consensus_tools::AppConfig;
use std::{fs, io::IsTerminal as _, path::PathBuf};
use tracing::metadata::LevelFilter;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use vise_exporter::MetricsExporter;

/// Rounds to finalize if neither the command line nor the config says otherwise.
const DEFAULT_ROUNDS: usize = 10;

/// Command-line application launching a localnet.
#[derive(Debug, Parser)]
struct Args {
    /// Verify configuration instead of launching the localnet.
    #[arg(long, conflicts_with = "rounds")]
    verify_config: bool,
    /// Path to a JSON file with the localnet configuration.
    #[arg(long, default_value = "config.json")]
    config_file: PathBuf,
    /// Exit after finalizing this many rounds. Overrides the config.
    #[arg(long)]
    rounds: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    tracing::trace!(?args, "Starting localnet");
    let ctx = &ctx::root();

    if !args.verify_config {
        // Create log file.
        fs::create_dir_all("logs/")?;
        let log_file = fs::File::create("logs/output.log")?;

        // Create the logger for stdout. This will produce human-readable logs for
        // all events of level INFO or higher, unless RUST_LOG says otherwise.
        let stdout_log = tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal())
            .with_file(false)
            .with_line_number(false)
            .with_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            );

        // Create the logger for the log file. This will produce machine-readable logs for
        // all events of level DEBUG or higher.
        let file_log = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(log_file)
            .with_filter(LevelFilter::DEBUG);

        let subscriber = Registry::default().with(stdout_log).with(file_log);
        tracing::subscriber::set_global_default(subscriber).context("set_global_default()")?;
    }

    tracing::debug!("Loading config file.");
    let cfg = AppConfig::read(&args.config_file).context("AppConfig::read()")?;
    if args.verify_config {
        tracing::info!("Configuration verified.");
        return Ok(());
    }
    let network = cfg.network()?;
    let rounds = args.rounds.or(cfg.rounds).unwrap_or(DEFAULT_ROUNDS);

    if let Some(addr) = cfg.metrics_server_addr {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let res = MetricsExporter::default()
                .with_graceful_shutdown(async move { ctx.canceled().await })
                .start(addr)
                .await;
            if let Err(err) = res {
                tracing::error!("metrics exporter: {err:#}");
            }
        });
    }

    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping.");
                ctx.cancel();
            }
        }
    });

    tracing::info!(
        "Starting {} provisioners, finalizing {rounds} rounds.",
        network.nodes.len()
    );
    let certs = match network.run(ctx, rounds).await {
        Ok(certs) => certs,
        Err(_) if !ctx.is_active() => return Ok(()),
        Err(err) => return Err(err).context("localnet stopped"),
    };
    for cert in &certs {
        tracing::info!(
            "round {}: {:?} at step {}, {} + {} signers",
            cert.round,
            cert.block_hash,
            cert.step,
            cert.first.signers.count(),
            cert.second.signers.count()
        );
    }
    ctx.cancel();
    Ok(())
}
