//! Remote fetch
//!
//! Runs the collection on every host of an inventory group over ssh, copies
//! the bundle and aggregate archive back into `<dest>/<host>/`, then removes
//! the remote workspace. Hosts are independent: one host failing never stops
//! the others. Fan-out is bounded by `forks`.

use crate::config::FetchConfig;
use crate::error::{CollectError, Result};
use crate::runner::{describe_failure, CommandRunner, CommandSpec};
use crate::summary::RunSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Host groups, keyed by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub groups: BTreeMap<String, HostGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostGroup {
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CollectError::Inventory(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| CollectError::Inventory(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Hosts of `group`; an unknown or empty group is an error
    pub fn hosts(&self, group: &str) -> Result<Vec<String>> {
        let hosts = self
            .groups
            .get(group)
            .map(|g| g.hosts.clone())
            .ok_or_else(|| CollectError::Inventory(format!("unknown group '{}'", group)))?;
        if hosts.is_empty() {
            return Err(CollectError::Inventory(format!("group '{}' has no hosts", group)));
        }
        if let Some(bad) = hosts.iter().find(|h| !is_valid_host(h)) {
            return Err(CollectError::Inventory(format!(
                "invalid host '{}' in group '{}'",
                bad, group
            )));
        }
        Ok(hosts)
    }
}

/// `[user@]host` without whitespace, and never mistakable for an ssh option
fn is_valid_host(host: &str) -> bool {
    !host.is_empty() && !host.starts_with('-') && !host.chars().any(char::is_whitespace)
}

/// Local directory name for a host: the part after `user@`
pub fn host_dir_name(host: &str) -> &str {
    host.rsplit_once('@').map(|(_, h)| h).unwrap_or(host)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Every artifact retrieved and remote workspace removed
    Fetched,
    /// Remote run happened but something after it went wrong
    Partial,
    /// Remote run did not produce a usable summary
    Failed,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Fetched => "fetched",
            HostStatus::Partial => "partial",
            HostStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub host: String,
    pub status: HostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_workspace: Option<PathBuf>,
    #[serde(default)]
    pub fetched: Vec<PathBuf>,
    pub cleaned: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl HostReport {
    fn failed(host: &str, warning: String) -> Self {
        warn!("{}: {}", host, warning);
        Self {
            host: host.to_string(),
            status: HostStatus::Failed,
            remote_workspace: None,
            fetched: Vec::new(),
            cleaned: false,
            warnings: vec![warning],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub group: String,
    pub hosts: Vec<HostReport>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.hosts.iter().all(|h| h.status == HostStatus::Fetched)
    }
}

/// Pull a JSON run summary out of remote stdout, tolerating banner lines
pub fn parse_remote_summary(stdout: &str) -> Option<RunSummary> {
    if let Ok(summary) = serde_json::from_str(stdout.trim()) {
        return Some(summary);
    }
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

fn ssh_spec(config: &FetchConfig, host: &str) -> CommandSpec {
    CommandSpec::new(&config.ssh)
        .args(["-o", "BatchMode=yes"])
        .arg(host)
}

/// Collect on one host, retrieve its artifacts and clean up
pub fn fetch_host(config: &FetchConfig, host: &str, runner: &dyn CommandRunner) -> HostReport {
    info!("{}: running remote collection", host);
    let spec = ssh_spec(config, host).arg(&config.remote_command);
    let result = runner.run(&spec);

    let summary = match &result {
        Ok(output) => parse_remote_summary(&output.stdout),
        Err(_) => None,
    };
    let Some(summary) = summary else {
        return HostReport::failed(host, describe_failure(&spec, &result));
    };

    let mut report = HostReport {
        host: host.to_string(),
        status: HostStatus::Fetched,
        remote_workspace: Some(summary.workspace.clone()),
        fetched: Vec::new(),
        cleaned: false,
        warnings: summary
            .warnings()
            .map(|(step, w)| format!("remote {}: {}", step.as_str(), w))
            .collect(),
    };

    let local_dir = config.dest.join(host_dir_name(host));
    let wanted: Vec<&PathBuf> = [&summary.artifacts.bundle, &summary.artifacts.archive]
        .into_iter()
        .flatten()
        .collect();
    if wanted.is_empty() {
        report.warnings.push("remote run produced no archives".to_string());
    }

    let mut all_fetched = true;
    if !wanted.is_empty() {
        if let Err(e) = fs::create_dir_all(&local_dir) {
            report
                .warnings
                .push(format!("cannot create {}: {}", local_dir.display(), e));
            all_fetched = false;
        }
    }

    if all_fetched {
        for remote in wanted {
            let spec = CommandSpec::new(&config.scp)
                .args(["-o", "BatchMode=yes", "-p"])
                .arg(format!("{}:{}", host, remote.display()))
                .path_arg(&local_dir);
            let result = runner.run(&spec);
            if matches!(&result, Ok(output) if output.success()) {
                let name = remote.file_name().map(PathBuf::from).unwrap_or_default();
                let local = local_dir.join(name);
                info!("{}: fetched {}", host, local.display());
                report.fetched.push(local);
            } else {
                let warning = describe_failure(&spec, &result);
                warn!("{}: {}", host, warning);
                report.warnings.push(warning);
                all_fetched = false;
            }
        }
    }

    if all_fetched {
        let spec = ssh_spec(config, host)
            .args(["rm", "-rf", "--"])
            .path_arg(&summary.workspace);
        let result = runner.run(&spec);
        if matches!(&result, Ok(output) if output.success()) {
            info!("{}: removed remote workspace {}", host, summary.workspace.display());
            report.cleaned = true;
        } else {
            let warning = describe_failure(&spec, &result);
            warn!("{}: {}", host, warning);
            report.warnings.push(warning);
        }
    } else {
        warn!(
            "{}: keeping remote workspace {} since retrieval was incomplete",
            host,
            summary.workspace.display()
        );
    }

    if !report.warnings.is_empty() || !report.cleaned {
        report.status = HostStatus::Partial;
    }
    report
}

/// Fetch from every host, at most `forks` at a time. Reports keep host order.
pub async fn fetch_group(
    config: FetchConfig,
    group: String,
    hosts: Vec<String>,
    runner: Arc<dyn CommandRunner>,
) -> FetchReport {
    let forks = config.effective_forks();
    info!("Fetching from {} host(s) in group '{}', {} at a time", hosts.len(), group, forks);

    let semaphore = Arc::new(Semaphore::new(forks));
    let config = Arc::new(config);
    let mut set = JoinSet::new();

    for (index, host) in hosts.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let runner = Arc::clone(&runner);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let task_host = host.clone();
            let report = tokio::task::spawn_blocking(move || {
                fetch_host(&config, &task_host, runner.as_ref())
            })
            .await
            .unwrap_or_else(|e| HostReport::failed(&host, format!("worker failed: {}", e)));
            (index, report)
        });
    }

    let mut slots: Vec<Option<HostReport>> = vec![None; hosts.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, report)) => slots[index] = Some(report),
            Err(e) => warn!("Fetch task failed: {}", e),
        }
    }

    let reports = slots
        .into_iter()
        .zip(hosts.iter())
        .map(|(slot, host)| {
            slot.unwrap_or_else(|| {
                HostReport::failed(host, "fetch task did not complete".to_string())
            })
        })
        .collect();

    FetchReport {
        group,
        hosts: reports,
    }
}
