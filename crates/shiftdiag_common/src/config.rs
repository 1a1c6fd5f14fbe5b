//! Shiftdiag configuration
//!
//! Configuration lives in /etc/shiftdiag/config.toml. Every key is optional;
//! a missing file yields the defaults below. CLI flags are layered on top by
//! the caller after loading.

use crate::error::{CollectError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/shiftdiag";
const CONFIG_FILE: &str = "config.toml";
const INVENTORY_FILE: &str = "inventory.toml";

/// Where diagnostics land when nothing else is configured
pub const DEFAULT_BASE_DIR: &str = "/var/tmp/microshift-diagnostics";

/// Kubeconfig written by MicroShift for the kubeadmin user
pub const DEFAULT_KUBECONFIG: &str = "/var/lib/microshift/resources/kubeadmin/kubeconfig";

/// How the diagnostic bundle generator is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BundleStrategy {
    /// `<tool> --tmp-dir <dir>`, output located afterwards by pattern and moved
    #[default]
    TmpDir,
    /// `<tool> report -o <dir>`, output written straight into the workspace
    Report,
    /// Bundle collection is not attempted
    Disabled,
}

impl BundleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStrategy::TmpDir => "tmp-dir",
            BundleStrategy::Report => "report",
            BundleStrategy::Disabled => "disabled",
        }
    }

    /// Tool used when the config does not name one
    pub fn default_tool(&self) -> &'static str {
        match self {
            BundleStrategy::TmpDir => "microshift-sos-report",
            BundleStrategy::Report | BundleStrategy::Disabled => "sos",
        }
    }
}

impl std::str::FromStr for BundleStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tmp-dir" => Ok(BundleStrategy::TmpDir),
            "report" => Ok(BundleStrategy::Report),
            "disabled" => Ok(BundleStrategy::Disabled),
            other => Err(format!(
                "unknown bundle strategy '{}' (expected tmp-dir, report or disabled)",
                other
            )),
        }
    }
}

/// Bundle (SOS report) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default)]
    pub strategy: BundleStrategy,

    /// Generator executable; defaults per strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Scratch directory handed to the tmp-dir strategy
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Glob used to find the generator's output in `tmp_dir`
    #[serde(default = "default_search_pattern")]
    pub search_pattern: String,

    /// Glob identifying a bundle archive already in the workspace
    #[serde(default = "default_existing_pattern")]
    pub existing_pattern: String,

    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Run the generator through `sudo -n`
    #[serde(default)]
    pub sudo: bool,
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/var/tmp")
}

fn default_search_pattern() -> String {
    "sosreport-microshift-*.tar.xz".to_string()
}

fn default_existing_pattern() -> String {
    "sosreport-*.tar.xz".to_string()
}

impl BundleConfig {
    pub fn effective_tool(&self) -> &str {
        self.tool
            .as_deref()
            .unwrap_or_else(|| self.strategy.default_tool())
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            strategy: BundleStrategy::default(),
            tool: None,
            tmp_dir: default_tmp_dir(),
            search_pattern: default_search_pattern(),
            existing_pattern: default_existing_pattern(),
            extra_args: Vec::new(),
            sudo: false,
        }
    }
}

/// Shape of the `get namespaces` query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceQuery {
    /// `get namespaces -o name`
    Plain,
    /// `get namespaces -o jsonpath={.items[*].metadata.name}`
    #[default]
    Jsonpath,
}

/// Namespace selection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceConfig {
    #[serde(default)]
    pub query: NamespaceQuery,

    /// Additional names excluded on exact match
    #[serde(default)]
    pub extra_excluded: Vec<String>,

    /// Additional substrings that exclude any namespace containing them
    #[serde(default)]
    pub extra_excluded_substrings: Vec<String>,
}

/// Aggregate archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_prefix")]
    pub prefix: String,
}

fn default_archive_prefix() -> String {
    "oc_adm_inspect_reports".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            prefix: default_archive_prefix(),
        }
    }
}

/// Remote fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_inventory")]
    pub inventory: PathBuf,

    #[serde(default = "default_group")]
    pub group: String,

    /// Local directory receiving one subdirectory per host
    #[serde(default = "default_dest")]
    pub dest: PathBuf,

    /// Command run on each host; must print a JSON run summary on stdout
    #[serde(default = "default_remote_command")]
    pub remote_command: String,

    #[serde(default = "default_ssh")]
    pub ssh: String,

    #[serde(default = "default_scp")]
    pub scp: String,

    /// Hosts processed at the same time (valid: 1-64)
    #[serde(default = "default_forks")]
    pub forks: usize,
}

fn default_inventory() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR).join(INVENTORY_FILE)
}

fn default_group() -> String {
    "edge".to_string()
}

fn default_dest() -> PathBuf {
    PathBuf::from("./diagnostics")
}

fn default_remote_command() -> String {
    "shiftdiagctl collect --json".to_string()
}

fn default_ssh() -> String {
    "ssh".to_string()
}

fn default_scp() -> String {
    "scp".to_string()
}

fn default_forks() -> usize {
    5
}

impl FetchConfig {
    pub fn effective_forks(&self) -> usize {
        self.forks.clamp(1, 64)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            inventory: default_inventory(),
            group: default_group(),
            dest: default_dest(),
            remote_command: default_remote_command(),
            ssh: default_ssh(),
            scp: default_scp(),
            forks: default_forks(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete shiftdiag configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftdiagConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: PathBuf,

    #[serde(default = "default_cluster_cli")]
    pub cluster_cli: String,

    #[serde(default)]
    pub bundle: BundleConfig,

    #[serde(default)]
    pub namespaces: NamespaceConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_DIR)
}

fn default_kubeconfig() -> PathBuf {
    PathBuf::from(DEFAULT_KUBECONFIG)
}

fn default_cluster_cli() -> String {
    "oc".to_string()
}

impl Default for ShiftdiagConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            kubeconfig: default_kubeconfig(),
            cluster_cli: default_cluster_cli(),
            bundle: BundleConfig::default(),
            namespaces: NamespaceConfig::default(),
            archive: ArchiveConfig::default(),
            fetch: FetchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ShiftdiagConfig {
    /// Load from the system config file, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from an explicit path. A missing file is not an error; a malformed one is.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|message| CollectError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (key, pattern) in [
            ("bundle.search_pattern", &self.bundle.search_pattern),
            ("bundle.existing_pattern", &self.bundle.existing_pattern),
        ] {
            glob::Pattern::new(pattern)
                .map_err(|e| format!("{} '{}' is not a valid glob: {}", key, pattern, e))?;
        }
        if self.archive.prefix.is_empty() || self.archive.prefix.contains('/') {
            return Err(format!(
                "archive.prefix '{}' must be a non-empty file name",
                self.archive.prefix
            ));
        }
        if self.cluster_cli.trim().is_empty() {
            return Err("cluster_cli must not be empty".to_string());
        }
        Ok(())
    }

    pub fn to_toml(&self) -> std::result::Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
}
