//! Slot lottery node
//!
//! `run` joins (or founds) a network, `keygen` prints a fresh identity and
//! `calibrate` estimates a hardness for a target block rate.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slot_core::consensus::calibrate_hardness;
use slot_core::crypto::KeyPair;
use slot_core::node::{launch, NodeConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Slot lottery ledger node")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node
    Run {
        /// JSON config file
        #[clap(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Peer-to-peer listen address
        #[clap(long, value_name = "ADDR")]
        listen: Option<String>,
        /// Address announced to peers
        #[clap(long, value_name = "ADDR")]
        advertise: Option<String>,
        /// Existing member to join through
        #[clap(long, value_name = "ADDR")]
        bootstrap: Option<String>,
        /// JSON-RPC listen address
        #[clap(long, value_name = "ADDR")]
        rpc: Option<String>,
        /// Hex-encoded secret key
        #[clap(long, value_name = "HEX")]
        secret: Option<String>,
    },
    /// Generate a key pair
    Keygen,
    /// Estimate a hardness by sampling draws
    Calibrate {
        #[clap(long, value_name = "INT", default_value = "10")]
        rounds: usize,
        #[clap(long, value_name = "INT", default_value = "1000")]
        samples: usize,
        /// Share of slots that should produce a block
        #[clap(long, value_name = "FLOAT", default_value = "0.1")]
        fraction: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    fmt().with_env_filter(filter).init();

    match Args::parse().command {
        Command::Run {
            config,
            listen,
            advertise,
            bootstrap,
            rpc,
            secret,
        } => {
            let mut config = match config {
                Some(path) => NodeConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => NodeConfig::default(),
            };
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            config.advertise_addr = advertise.or(config.advertise_addr);
            config.bootstrap = bootstrap.or(config.bootstrap);
            config.rpc_addr = rpc.or(config.rpc_addr);
            config.secret_key_hex = secret.or(config.secret_key_hex);

            run(config).await
        }
        Command::Keygen => {
            let keypair = KeyPair::generate();
            println!("secret:     {}", keypair.secret_hex());
            println!("public key: {}", keypair.public_key);
            Ok(())
        }
        Command::Calibrate {
            rounds,
            samples,
            fraction,
        } => {
            info!(rounds, samples, fraction, "calibrating hardness");
            println!("{}", calibrate_hardness(rounds, samples, fraction));
            Ok(())
        }
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    let running = launch(config).await.context("starting node")?;
    info!(
        p2p = %running.p2p_addr(),
        rpc = ?running.rpc_addr(),
        key = %running.node().public_key(),
        "node running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    running.shutdown();
    Ok(())
}
