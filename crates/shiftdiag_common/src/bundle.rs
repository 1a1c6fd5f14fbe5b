//! Bundle collection (SOS report)
//!
//! Two generator interfaces exist: one that writes into a scratch directory we
//! search afterwards, and one that accepts the destination directly. The
//! strategy comes from configuration. A bundle already in the workspace short-
//! circuits collection so reruns do not regenerate it.

use crate::config::{BundleConfig, BundleStrategy};
use crate::credential::CredentialScope;
use crate::runner::{describe_failure, CommandRunner, CommandSpec};
use crate::summary::{Step, StepReport};
use crate::workspace::{files_matching, Workspace};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

/// Outcome of the bundle step plus the archive it left in the workspace, if any
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    pub report: StepReport,
    pub archive: Option<PathBuf>,
}

impl BundleOutcome {
    fn new(report: StepReport, archive: Option<PathBuf>) -> Self {
        Self { report, archive }
    }

    fn failed(warning: String) -> Self {
        warn!("Bundle collection failed: {}", warning);
        Self::new(StepReport::failed(Step::Bundle, warning), None)
    }
}

pub struct BundleCollector<'a> {
    config: &'a BundleConfig,
}

impl<'a> BundleCollector<'a> {
    pub fn new(config: &'a BundleConfig) -> Self {
        Self { config }
    }

    /// Pattern identifying a finished bundle inside a workspace
    pub fn existing_pattern(&self) -> Result<Pattern, glob::PatternError> {
        Pattern::new(&self.config.existing_pattern)
    }

    pub fn collect(
        &self,
        workspace: &Workspace,
        runner: &dyn CommandRunner,
        scope: &mut CredentialScope<'_>,
    ) -> BundleOutcome {
        if self.config.strategy == BundleStrategy::Disabled {
            info!("Bundle collection disabled");
            return BundleOutcome::new(StepReport::skipped(Step::Bundle, "disabled"), None);
        }

        let existing_pattern = match self.existing_pattern() {
            Ok(p) => p,
            Err(e) => {
                return BundleOutcome::failed(format!(
                    "invalid bundle pattern '{}': {}",
                    self.config.existing_pattern, e
                ))
            }
        };

        match workspace.files_matching(&existing_pattern) {
            Ok(found) => {
                if let Some(existing) = found.into_iter().next() {
                    info!(
                        "Bundle {} already present, skipping collection",
                        existing.display()
                    );
                    let detail = format!("already present: {}", file_name(&existing));
                    return BundleOutcome::new(
                        StepReport::skipped(Step::Bundle, detail),
                        Some(existing),
                    );
                }
            }
            Err(e) => {
                return BundleOutcome::failed(format!(
                    "cannot read workspace {}: {}",
                    workspace.root().display(),
                    e
                ))
            }
        }

        if self.config.strategy == BundleStrategy::Report {
            self.collect_direct(workspace, runner, scope, &existing_pattern)
        } else {
            self.collect_via_tmp_dir(workspace, runner, scope)
        }
    }

    fn build_spec(&self, leading: Vec<String>, scope: &mut CredentialScope<'_>) -> CommandSpec {
        let spec = CommandSpec::new(self.config.effective_tool())
            .args(leading)
            .args(self.config.extra_args.iter().cloned());
        let spec = scope.authorize(spec);
        if self.config.sudo {
            spec.with_sudo()
        } else {
            spec
        }
    }

    fn collect_via_tmp_dir(
        &self,
        workspace: &Workspace,
        runner: &dyn CommandRunner,
        scope: &mut CredentialScope<'_>,
    ) -> BundleOutcome {
        let search = match Pattern::new(&self.config.search_pattern) {
            Ok(p) => p,
            Err(e) => {
                return BundleOutcome::failed(format!(
                    "invalid search pattern '{}': {}",
                    self.config.search_pattern, e
                ))
            }
        };
        let tmp_dir = &self.config.tmp_dir;
        let before = files_matching(tmp_dir, &search).unwrap_or_default();

        let spec = self.build_spec(
            vec![
                "--tmp-dir".to_string(),
                tmp_dir.to_string_lossy().into_owned(),
            ],
            scope,
        );
        info!("Generating bundle: {}", spec.display());
        let result = runner.run(&spec);
        if !matches!(&result, Ok(output) if output.success()) {
            return BundleOutcome::failed(describe_failure(&spec, &result));
        }

        let candidates = match files_matching(tmp_dir, &search) {
            Ok(c) => c,
            Err(e) => {
                return BundleOutcome::failed(format!(
                    "cannot search {}: {}",
                    tmp_dir.display(),
                    e
                ))
            }
        };
        let fresh: Vec<PathBuf> = candidates
            .iter()
            .filter(|c| !before.contains(c))
            .cloned()
            .collect();
        // Prefer what this run produced; fall back to the newest match
        let pick = newest(if fresh.is_empty() { &candidates } else { &fresh });

        let Some(source) = pick else {
            return BundleOutcome::failed(format!(
                "{} finished but no file matching {} appeared in {}",
                self.config.effective_tool(),
                self.config.search_pattern,
                tmp_dir.display()
            ));
        };

        let dest = workspace.join(&file_name(&source));
        match move_file(&source, &dest) {
            Ok(()) => {
                info!("Bundle stored at {}", dest.display());
                BundleOutcome::new(
                    StepReport::succeeded(Step::Bundle, format!("collected {}", file_name(&dest))),
                    Some(dest),
                )
            }
            Err(e) => BundleOutcome::failed(format!(
                "cannot move {} into workspace: {}",
                source.display(),
                e
            )),
        }
    }

    fn collect_direct(
        &self,
        workspace: &Workspace,
        runner: &dyn CommandRunner,
        scope: &mut CredentialScope<'_>,
        existing_pattern: &Pattern,
    ) -> BundleOutcome {
        let spec = self.build_spec(
            vec![
                "report".to_string(),
                "-o".to_string(),
                workspace.root().to_string_lossy().into_owned(),
            ],
            scope,
        );
        info!("Generating bundle: {}", spec.display());
        let result = runner.run(&spec);
        if !matches!(&result, Ok(output) if output.success()) {
            return BundleOutcome::failed(describe_failure(&spec, &result));
        }

        let produced = workspace
            .files_matching(existing_pattern)
            .unwrap_or_default();
        match newest(&produced) {
            Some(path) => {
                info!("Bundle stored at {}", path.display());
                BundleOutcome::new(
                    StepReport::succeeded(Step::Bundle, format!("collected {}", file_name(&path))),
                    Some(path),
                )
            }
            None => BundleOutcome::failed(format!(
                "{} finished but wrote no file matching {}",
                self.config.effective_tool(),
                self.config.existing_pattern
            )),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn newest(paths: &[PathBuf]) -> Option<PathBuf> {
    paths
        .iter()
        .max_by_key(|p| {
            fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
        .cloned()
}

/// Rename, or copy and remove when crossing filesystems
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ClusterCredential;
    use crate::runner::{CommandOutput, KUBECONFIG_ENV};
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Pretends to be a bundle generator writing `name` into `dir`
    struct FakeGenerator {
        dir: Option<PathBuf>,
        name: &'static str,
        exit_code: i32,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeGenerator {
        fn new(dir: Option<PathBuf>, name: &'static str, exit_code: i32) -> Self {
            Self {
                dir,
                name,
                exit_code,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeGenerator {
        fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            if self.exit_code == 0 {
                if let Some(dir) = &self.dir {
                    fs::write(dir.join(self.name), b"bundle").unwrap();
                }
            }
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "sos: plugin timeout".to_string()
                },
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        tmp: PathBuf,
        workspace: Workspace,
        credential: ClusterCredential,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("tmp");
        fs::create_dir(&tmp).unwrap();
        let kubeconfig = dir.path().join("kubeconfig");
        fs::write(&kubeconfig, b"apiVersion: v1\n").unwrap();
        let workspace = Workspace::prepare(
            &dir.path().join("base"),
            &Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
        .unwrap();
        let credential = ClusterCredential::resolve(&kubeconfig).unwrap();
        Fixture {
            _dir: dir,
            tmp,
            workspace,
            credential,
        }
    }

    #[test]
    fn test_tmp_dir_strategy_moves_output_into_workspace() {
        let fx = fixture();
        let config = BundleConfig {
            tmp_dir: fx.tmp.clone(),
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(
            Some(fx.tmp.clone()),
            "sosreport-microshift-edge-2024.tar.xz",
            0,
        );

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);

        let expected = fx.workspace.join("sosreport-microshift-edge-2024.tar.xz");
        assert_eq!(outcome.report.status, crate::summary::StepStatus::Succeeded);
        assert_eq!(outcome.archive, Some(expected.clone()));
        assert!(expected.exists());
        assert!(!fx.tmp.join("sosreport-microshift-edge-2024.tar.xz").exists());

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "microshift-sos-report");
        assert_eq!(calls[0].args[0], "--tmp-dir");
        assert!(calls[0].env_value(KUBECONFIG_ENV).is_some());
    }

    #[test]
    fn test_report_strategy_writes_directly() {
        let fx = fixture();
        let config = BundleConfig {
            strategy: BundleStrategy::Report,
            extra_args: vec!["--batch".to_string()],
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(
            Some(fx.workspace.root().to_path_buf()),
            "sosreport-edge-01-2024.tar.xz",
            0,
        );

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);

        assert_eq!(outcome.report.status, crate::summary::StepStatus::Succeeded);
        assert_eq!(
            outcome.archive,
            Some(fx.workspace.join("sosreport-edge-01-2024.tar.xz"))
        );
        let calls = runner.calls();
        assert_eq!(calls[0].program, "sos");
        assert_eq!(calls[0].args[..2], ["report".to_string(), "-o".to_string()]);
        assert_eq!(calls[0].args.last().map(String::as_str), Some("--batch"));
    }

    #[test]
    fn test_existing_bundle_skips_generation() {
        let fx = fixture();
        fs::write(fx.workspace.join("sosreport-microshift-old.tar.xz"), b"old").unwrap();
        let config = BundleConfig {
            tmp_dir: fx.tmp.clone(),
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(Some(fx.tmp.clone()), "unused.tar.xz", 0);

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);

        assert_eq!(outcome.report.status, crate::summary::StepStatus::Skipped);
        assert!(outcome.report.detail.contains("already present"));
        assert!(runner.calls().is_empty());
        assert_eq!(scope.granted(), 0);
    }

    #[test]
    fn test_generator_failure_is_a_warning() {
        let fx = fixture();
        let config = BundleConfig {
            tmp_dir: fx.tmp.clone(),
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(None, "never", 1);

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);

        assert_eq!(outcome.report.status, crate::summary::StepStatus::Failed);
        assert!(outcome.report.warnings[0].contains("plugin timeout"));
        assert!(outcome.archive.is_none());
    }

    #[test]
    fn test_success_without_output_is_a_warning() {
        let fx = fixture();
        let config = BundleConfig {
            tmp_dir: fx.tmp.clone(),
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(None, "never", 0);

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);

        assert_eq!(outcome.report.status, crate::summary::StepStatus::Failed);
        assert!(outcome.report.detail.contains("no file matching"));
    }

    #[test]
    fn test_disabled_strategy_is_skipped() {
        let fx = fixture();
        let config = BundleConfig {
            strategy: BundleStrategy::Disabled,
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(None, "never", 0);

        let mut scope = fx.credential.scope();
        let outcome = BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);
        assert_eq!(outcome.report.status, crate::summary::StepStatus::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_sudo_wraps_generator() {
        let fx = fixture();
        let config = BundleConfig {
            tmp_dir: fx.tmp.clone(),
            sudo: true,
            ..BundleConfig::default()
        };
        let runner = FakeGenerator::new(None, "never", 1);

        let mut scope = fx.credential.scope();
        BundleCollector::new(&config).collect(&fx.workspace, &runner, &mut scope);
        let calls = runner.calls();
        assert_eq!(calls[0].program, "sudo");
        assert_eq!(calls[0].args[2], "microshift-sos-report");
    }
}
