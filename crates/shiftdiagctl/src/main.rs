//! Shiftdiag Control - collect MicroShift diagnostics
//!
//! `collect` runs on the edge host itself; `fetch` drives `collect` on a group
//! of hosts over ssh and pulls the archives back.

mod commands;

use clap::{Parser, Subcommand};
use shiftdiag_common::config::BundleStrategy;
use std::path::PathBuf;

// Version is embedded at build time
const VERSION: &str = env!("SHIFTDIAG_VERSION");
const LONG_VERSION: &str = env!("SHIFTDIAG_LONG_VERSION");

#[derive(Parser)]
#[command(name = "shiftdiagctl")]
#[command(
    about = "Collect SOS reports and namespace inspections from MicroShift",
    long_about = None
)]
#[command(version = VERSION, long_version = LONG_VERSION)]
struct Cli {
    /// Configuration file (default /etc/shiftdiag/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect diagnostics on this host
    Collect {
        /// Directory receiving the timestamped workspace
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Kubeconfig used for cluster access
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Bundle generator interface: tmp-dir, report or disabled
        #[arg(long)]
        bundle_strategy: Option<BundleStrategy>,

        /// Do not generate an SOS report
        #[arg(long)]
        skip_bundle: bool,

        /// Reuse an existing workspace directory instead of creating one
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the application namespaces that would be inspected
    Namespaces {
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Collect on remote hosts and fetch the archives
    Fetch {
        /// Inventory file with host groups
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Host group to target
        #[arg(long)]
        group: Option<String>,

        /// Local destination directory
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Hosts processed concurrently
        #[arg(long)]
        forks: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            shiftdiagctl::errors::exit_code_for(&e)
        }
    };

    std::process::exit(code);
}
