//! ## Startup
//!
//! Command line parsing, logger setup and the crash supervisor.
//!
//! Unless `--avoid-recovery` is given the binary does not run a node itself.
//! It re-runs itself with `--avoid-recovery` as a child and starts a new
//! child whenever the old one dies with a non-zero status. The new node then
//! rejoins through the session manager.

use std::env;
use std::process::Command;
use std::thread;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use crate::config::{self, NetworkConfig, Settings};

/// Node of a distributed elevator bank
#[derive(Parser, Debug, Clone)]
#[command(name = "elevatorbank")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Expected number of nodes in the cluster
    #[arg(long, default_value_t = 1)]
    pub nodes: usize,

    /// Run the node in the foreground, without the crash supervisor
    #[arg(long)]
    pub avoid_recovery: bool,

    /// Use this node id instead of the one derived from the peer addresses
    #[arg(long)]
    pub elevator_id: Option<i32>,

    /// Address of the elevator server
    #[arg(long, default_value = config::LOCAL_ELEV_ADDR)]
    pub server: String,

    /// Number of floors, numbered from 1
    #[arg(long, default_value_t = config::DEFAULT_NUM_FLOORS)]
    pub floors: u8,

    /// Drive an in-memory simulated car instead of the elevator server
    #[arg(long)]
    pub simulator: bool,

    /// Periodically print the global state table
    #[arg(long)]
    pub print_state: bool,
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        Settings {
            nodes: args.nodes.max(1),
            avoid_recovery: args.avoid_recovery,
            elevator_id: args.elevator_id,
            server: args.server,
            floors: args.floors.max(2),
            simulator: args.simulator,
            print_state: args.print_state,
            network: NetworkConfig::default(),
        }
    }
}

/// Reads the [Settings] from the process arguments.
pub fn parse_args() -> Settings {
    Args::parse().into()
}

/// Installs `env_logger`, `info` unless `RUST_LOG` says otherwise.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Runs the node as a supervised child until it exits cleanly.
///
/// ## Returns
/// The exit code of the last child, 0 once a child succeeded.
pub fn run_supervised() -> anyhow::Result<i32> {
    let exe = env::current_exe().context("could not locate the executable")?;
    let args: Vec<String> = env::args().skip(1).collect();
    loop {
        info!("starting node {:?}", exe);
        let status = Command::new(&exe)
            .args(&args)
            .arg("--avoid-recovery")
            .status()
            .with_context(|| format!("could not start {:?}", exe))?;
        if status.success() {
            return Ok(0);
        }
        match status.code() {
            Some(code) => warn!("node exited with status {}, restarting", code),
            None => error!("node was killed by a signal, restarting"),
        }
        thread::sleep(config::RESPAWN_DELAY);
    }
}
