//! Command implementations for shiftdiagctl

use crate::{Cli, Commands};
use anyhow::{Context, Result};
use shiftdiag_common::config::{config_path, ShiftdiagConfig};
use shiftdiag_common::fetch::{fetch_group, Inventory};
use shiftdiag_common::{CollectOptions, Collector, CommandRunner, SystemRunner};
use shiftdiagctl::errors::{EXIT_FATAL, EXIT_SUCCESS};
use shiftdiagctl::{logging, output};
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::info;

pub async fn run(cli: Cli) -> Result<i32> {
    let path = cli.config.clone().unwrap_or_else(config_path);
    let loaded = ShiftdiagConfig::load_from(&path);
    let level = loaded
        .as_ref()
        .map(|c| c.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    logging::init(&level, cli.verbose, cli.quiet);
    let mut config = loaded?;

    let color = std::io::stdout().is_terminal();

    match cli.command {
        Commands::Collect {
            base_dir,
            kubeconfig,
            bundle_strategy,
            skip_bundle,
            workspace,
            json,
        } => {
            if let Some(dir) = base_dir {
                config.base_dir = dir;
            }
            if let Some(path) = kubeconfig {
                config.kubeconfig = path;
            }
            if let Some(strategy) = bundle_strategy {
                config.bundle.strategy = strategy;
            }
            let options = CollectOptions {
                workspace,
                skip_bundle,
            };
            collect(config, options, json, color).await
        }
        Commands::Namespaces { kubeconfig, json } => {
            if let Some(path) = kubeconfig {
                config.kubeconfig = path;
            }
            namespaces(config, json).await
        }
        Commands::Fetch {
            inventory,
            group,
            dest,
            forks,
            json,
        } => {
            let fetch = &mut config.fetch;
            if let Some(path) = inventory {
                fetch.inventory = path;
            }
            if let Some(name) = group {
                fetch.group = name;
            }
            if let Some(path) = dest {
                fetch.dest = path;
            }
            if let Some(n) = forks {
                fetch.forks = n;
            }
            fetch_cmd(config, json, color).await
        }
        Commands::Config => {
            let text = config
                .to_toml()
                .map_err(|e| anyhow::anyhow!("cannot render configuration: {}", e))?;
            print!("{}", text);
            Ok(EXIT_SUCCESS)
        }
    }
}

async fn collect(
    config: ShiftdiagConfig,
    options: CollectOptions,
    json: bool,
    color: bool,
) -> Result<i32> {
    info!("shiftdiagctl {} collecting into {}", crate::VERSION, config.base_dir.display());

    let summary = tokio::task::spawn_blocking(move || {
        let now = chrono::Local::now();
        Collector::new(&config, &SystemRunner).run(&options, &now)
    })
    .await
    .context("collection worker failed")??;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print!("{}", output::render_summary(&summary, color));
    }
    Ok(EXIT_SUCCESS)
}

async fn namespaces(config: ShiftdiagConfig, json: bool) -> Result<i32> {
    let listing = tokio::task::spawn_blocking(move || {
        Collector::new(&config, &SystemRunner).list_namespaces()
    })
    .await
    .context("namespace listing worker failed")??;

    if json {
        println!("{}", serde_json::to_string(&listing.namespaces)?);
    } else {
        for name in &listing.namespaces {
            println!("{}", name);
        }
    }
    for warning in &listing.report.warnings {
        eprintln!("warning: {}", warning);
    }
    if listing.report.status.is_problem() {
        return Ok(EXIT_FATAL);
    }
    Ok(EXIT_SUCCESS)
}

async fn fetch_cmd(config: ShiftdiagConfig, json: bool, color: bool) -> Result<i32> {
    let fetch = config.fetch;
    let inventory = Inventory::load(&fetch.inventory)?;
    let hosts = inventory.hosts(&fetch.group)?;

    let group = fetch.group.clone();
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let report = fetch_group(fetch, group, hosts, runner).await;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print!("{}", output::render_fetch(&report, color));
    }
    Ok(EXIT_SUCCESS)
}
