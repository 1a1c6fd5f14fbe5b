//! Namespace discovery and per-namespace inspection
//!
//! Filtering policy: a namespace is a system namespace when its name equals
//! one of [`RESERVED_NAMESPACES`] or contains one of [`RESERVED_SUBSTRINGS`].
//! Configuration can add names and substrings but never remove the built-in
//! ones. Inspection runs one namespace at a time; a failure is recorded and
//! the loop moves on.

use crate::config::{NamespaceConfig, NamespaceQuery};
use crate::credential::CredentialScope;
use crate::runner::{describe_failure, CommandRunner, CommandSpec};
use crate::summary::{NamespaceResult, Step, StepReport, StepStatus};
use crate::workspace::Workspace;
use std::fs;
use tracing::{info, warn};

/// Names always excluded on exact match
pub const RESERVED_NAMESPACES: &[&str] = &[
    "default",
    "kube-system",
    "kube-public",
    "kube-node-lease",
];

/// Substrings that mark any namespace containing them as a system namespace
pub const RESERVED_SUBSTRINGS: &[&str] = &["openshift", "kube"];

const JSONPATH_NAMES: &str = "jsonpath={.items[*].metadata.name}";

#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    exact: Vec<String>,
    substrings: Vec<String>,
}

impl Default for NamespaceFilter {
    fn default() -> Self {
        Self {
            exact: RESERVED_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            substrings: RESERVED_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NamespaceFilter {
    pub fn from_config(config: &NamespaceConfig) -> Self {
        let mut filter = Self::default();
        filter.exact.extend(config.extra_excluded.iter().cloned());
        filter.substrings.extend(
            config
                .extra_excluded_substrings
                .iter()
                .filter(|s| !s.is_empty())
                .cloned(),
        );
        filter
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exact.iter().any(|e| e == name)
            || self.substrings.iter().any(|s| name.contains(s.as_str()))
    }

    /// Keep application namespaces, preserving order and dropping duplicates
    pub fn apply(&self, names: &[String]) -> Vec<String> {
        let mut kept: Vec<String> = Vec::new();
        for name in names {
            if self.is_excluded(name) || kept.contains(name) {
                continue;
            }
            kept.push(name.clone());
        }
        kept
    }
}

/// RFC 1123 label, the only shape a namespace name can take
pub fn is_valid_namespace_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// `get namespaces` invocation for the configured query shape
pub fn list_spec(cli: &str, query: NamespaceQuery) -> CommandSpec {
    let spec = CommandSpec::new(cli).args(["get", "namespaces", "-o"]);
    match query {
        NamespaceQuery::Plain => spec.arg("name"),
        NamespaceQuery::Jsonpath => spec.arg(JSONPATH_NAMES),
    }
}

/// Parse `get namespaces` output into names
pub fn parse_namespace_list(query: NamespaceQuery, stdout: &str) -> Vec<String> {
    match query {
        NamespaceQuery::Plain => stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.strip_prefix("namespace/").unwrap_or(l).to_string())
            .collect(),
        NamespaceQuery::Jsonpath => stdout
            .split_whitespace()
            .map(|s| s.trim_matches('\'').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// `adm inspect ns/<name> --dest-dir=<dir>` invocation
pub fn inspect_spec(cli: &str, namespace: &str, dest: &std::path::Path) -> CommandSpec {
    CommandSpec::new(cli)
        .args(["adm", "inspect"])
        .arg(format!("ns/{}", namespace))
        .arg(format!("--dest-dir={}", dest.display()))
}

#[derive(Debug, Clone)]
pub struct NamespaceListing {
    pub report: StepReport,
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InspectionRun {
    pub report: StepReport,
    pub results: Vec<NamespaceResult>,
}

impl InspectionRun {
    /// Whether at least one namespace produced output
    pub fn any_succeeded(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == StepStatus::Succeeded)
    }
}

pub struct NamespaceInspector<'a> {
    cli: &'a str,
    query: NamespaceQuery,
    filter: NamespaceFilter,
}

impl<'a> NamespaceInspector<'a> {
    pub fn new(cli: &'a str, config: &NamespaceConfig) -> Self {
        Self {
            cli,
            query: config.query,
            filter: NamespaceFilter::from_config(config),
        }
    }

    pub fn list(
        &self,
        runner: &dyn CommandRunner,
        scope: &mut CredentialScope<'_>,
    ) -> NamespaceListing {
        let spec = scope.authorize(list_spec(self.cli, self.query));
        let result = runner.run(&spec);
        let output = match &result {
            Ok(output) if output.success() => output,
            _ => {
                let warning = describe_failure(&spec, &result);
                warn!("Listing namespaces failed: {}", warning);
                return NamespaceListing {
                    report: StepReport::failed(Step::Namespaces, warning),
                    namespaces: Vec::new(),
                };
            }
        };

        let all = parse_namespace_list(self.query, &output.stdout);
        let mut warnings = Vec::new();
        let valid: Vec<String> = all
            .into_iter()
            .filter(|name| {
                let ok = is_valid_namespace_name(name);
                if !ok {
                    warn!("Ignoring malformed namespace name {:?}", name);
                    warnings.push(format!("ignored malformed namespace name {:?}", name));
                }
                ok
            })
            .collect();
        let namespaces = self.filter.apply(&valid);

        let report = if namespaces.is_empty() {
            info!("No application namespaces found");
            StepReport::succeeded(Step::Namespaces, "no application namespaces")
        } else {
            info!("Found {} application namespace(s): {}", namespaces.len(), namespaces.join(", "));
            StepReport::succeeded(
                Step::Namespaces,
                format!("{} application namespace(s)", namespaces.len()),
            )
        };

        NamespaceListing {
            report: StepReport { warnings, ..report },
            namespaces,
        }
    }

    pub fn inspect_all(
        &self,
        workspace: &Workspace,
        namespaces: &[String],
        runner: &dyn CommandRunner,
        scope: &mut CredentialScope<'_>,
    ) -> InspectionRun {
        if namespaces.is_empty() {
            return InspectionRun {
                report: StepReport::skipped(Step::Inspection, "no namespaces to inspect"),
                results: Vec::new(),
            };
        }

        let mut results = Vec::with_capacity(namespaces.len());
        let mut warnings = Vec::new();

        for namespace in namespaces {
            let dest = workspace.join(namespace);
            // Output left by an earlier run into a reused workspace is never removed
            let existed = dest.exists();
            let spec = scope.authorize(inspect_spec(self.cli, namespace, &dest));
            info!("Inspecting namespace {}", namespace);
            let result = runner.run(&spec);

            if matches!(&result, Ok(output) if output.success()) {
                results.push(NamespaceResult {
                    name: namespace.clone(),
                    status: StepStatus::Succeeded,
                    output_dir: dest.is_dir().then_some(dest),
                    error: None,
                });
                continue;
            }

            let warning = describe_failure(&spec, &result);
            warn!("Inspection of namespace {} failed: {}", namespace, warning);
            if existed {
                info!("Keeping earlier output for namespace {} in {}", namespace, dest.display());
            } else if dest.exists() {
                if let Err(e) = fs::remove_dir_all(&dest) {
                    warn!("Could not remove partial output {}: {}", dest.display(), e);
                }
            }
            warnings.push(format!("ns/{}: {}", namespace, warning));
            results.push(NamespaceResult {
                name: namespace.clone(),
                status: StepStatus::Failed,
                output_dir: None,
                error: Some(warning),
            });
        }

        let succeeded = results
            .iter()
            .filter(|r| r.status == StepStatus::Succeeded)
            .count();
        let detail = format!("{} of {} namespace(s) inspected", succeeded, results.len());
        let report = if succeeded == results.len() {
            StepReport::succeeded(Step::Inspection, detail)
        } else if succeeded == 0 {
            StepReport {
                status: StepStatus::Failed,
                ..StepReport::partial(Step::Inspection, detail, warnings)
            }
        } else {
            StepReport::partial(Step::Inspection, detail, warnings)
        };

        InspectionRun { report, results }
    }
}
