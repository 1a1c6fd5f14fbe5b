//! Collection workflow
//!
//! Sequences workspace preparation, credential resolution, bundle collection,
//! namespace inspection and archiving. Only the first two can abort a run;
//! everything after them is recorded in the [`RunSummary`] and the run goes on.

use crate::archive::Archiver;
use crate::bundle::BundleCollector;
use crate::config::ShiftdiagConfig;
use crate::credential::ClusterCredential;
use crate::error::Result;
use crate::namespaces::{NamespaceInspector, NamespaceListing};
use crate::runner::CommandRunner;
use crate::summary::{RunSummary, Step, StepReport};
use crate::workspace::Workspace;
use chrono::{DateTime, TimeZone};
use glob::Pattern;
use std::path::PathBuf;
use tracing::{info, warn};

/// Per-invocation switches that are not part of the configuration file
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Reuse this workspace instead of preparing a new one
    pub workspace: Option<PathBuf>,
    pub skip_bundle: bool,
}

pub struct Collector<'a> {
    config: &'a ShiftdiagConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> Collector<'a> {
    pub fn new(config: &'a ShiftdiagConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Run the whole collection once, as started at `now`
    pub fn run<Tz: TimeZone>(
        &self,
        options: &CollectOptions,
        now: &DateTime<Tz>,
    ) -> Result<RunSummary>
    where
        Tz::Offset: std::fmt::Display,
    {
        let workspace = match &options.workspace {
            Some(path) => Workspace::open(path)?,
            None => Workspace::prepare(&self.config.base_dir, now)?,
        };

        let credential = match ClusterCredential::resolve(&self.config.kubeconfig) {
            Ok(credential) => credential,
            Err(e) => {
                workspace.discard_if_empty();
                return Err(e);
            }
        };

        let mut summary = RunSummary::new(workspace.timestamp(), workspace.root().to_path_buf());
        summary.record(StepReport::succeeded(
            Step::Workspace,
            workspace.root().display().to_string(),
        ));
        summary.record(StepReport::succeeded(
            Step::Credential,
            credential.path().display().to_string(),
        ));

        let mut scope = credential.scope();

        let bundle = if options.skip_bundle {
            info!("Bundle collection skipped by request");
            StepReport::skipped(Step::Bundle, "skipped by request")
        } else {
            let outcome = BundleCollector::new(&self.config.bundle).collect(
                &workspace,
                self.runner,
                &mut scope,
            );
            summary.artifacts.bundle = outcome.archive;
            outcome.report
        };
        summary.record(bundle);

        let inspector = NamespaceInspector::new(&self.config.cluster_cli, &self.config.namespaces);
        let listing = inspector.list(self.runner, &mut scope);
        let listing_ok = !listing.report.status.is_problem();
        summary.record(listing.report);

        let inspection = if listing_ok {
            inspector.inspect_all(&workspace, &listing.namespaces, self.runner, &mut scope)
        } else {
            crate::namespaces::InspectionRun {
                report: StepReport::skipped(Step::Inspection, "namespace listing failed"),
                results: Vec::new(),
            }
        };
        drop(scope);

        let inspected = inspection.any_succeeded();
        summary.artifacts.inspections = inspection
            .results
            .iter()
            .filter_map(|r| r.output_dir.clone())
            .collect();
        summary.namespaces = inspection.results;
        summary.record(inspection.report);

        if inspected {
            // Patterns were validated when the configuration was loaded
            let bundle_pattern =
                Pattern::new(&self.config.bundle.existing_pattern).unwrap_or_default();
            let outcome =
                Archiver::new(&self.config.archive.prefix, bundle_pattern).create(&workspace);
            summary.artifacts.archive = outcome.archive;
            summary.record(outcome.report);
        } else {
            info!("No successful inspections, skipping archive");
            summary.record(StepReport::skipped(Step::Archive, "no successful inspections"));
        }

        let warnings = summary.warnings().count();
        if warnings == 0 {
            info!("Collection finished in {}", workspace.root().display());
        } else {
            warn!(
                "Collection finished in {} with {} warning(s)",
                workspace.root().display(),
                warnings
            );
        }

        Ok(summary)
    }

    /// Resolve the credential and list application namespaces without inspecting
    pub fn list_namespaces(&self) -> Result<NamespaceListing> {
        let credential = ClusterCredential::resolve(&self.config.kubeconfig)?;
        let mut scope = credential.scope();
        let inspector = NamespaceInspector::new(&self.config.cluster_cli, &self.config.namespaces);
        Ok(inspector.list(self.runner, &mut scope))
    }
}
