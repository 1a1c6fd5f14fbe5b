//! Run summary
//!
//! Each collection step reports its own outcome; the workflow folds them into
//! a [`RunSummary`] so completeness can be judged without reading logs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workflow steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Workspace,
    Credential,
    Bundle,
    Namespaces,
    Inspection,
    Archive,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Workspace => "workspace",
            Step::Credential => "credential",
            Step::Bundle => "bundle",
            Step::Namespaces => "namespaces",
            Step::Inspection => "inspection",
            Step::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    /// Not attempted; not a failure
    Skipped,
    /// Some units of work failed, others succeeded
    Partial,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "ok",
            StepStatus::Skipped => "skipped",
            StepStatus::Partial => "partial",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, StepStatus::Partial | StepStatus::Failed)
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    pub status: StepStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepReport {
    pub fn succeeded(step: Step, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Succeeded,
            detail: detail.into(),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(step: Step, reason: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            detail: reason.into(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(step: Step, warning: impl Into<String>) -> Self {
        let warning = warning.into();
        Self {
            step,
            status: StepStatus::Failed,
            detail: warning.clone(),
            warnings: vec![warning],
        }
    }

    pub fn partial(step: Step, detail: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            step,
            status: StepStatus::Partial,
            detail: detail.into(),
            warnings,
        }
    }
}

/// Inspection result for one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Files and directories a run left in its workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub bundle: Option<PathBuf>,
    #[serde(default)]
    pub inspections: Vec<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// Everything one collection run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub workspace: PathBuf,
    pub steps: Vec<StepReport>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceResult>,
    #[serde(default)]
    pub artifacts: Artifacts,
}

impl RunSummary {
    pub fn new(timestamp: impl Into<String>, workspace: PathBuf) -> Self {
        Self {
            timestamp: timestamp.into(),
            workspace,
            steps: Vec::new(),
            namespaces: Vec::new(),
            artifacts: Artifacts::default(),
        }
    }

    pub fn record(&mut self, report: StepReport) {
        self.steps.push(report);
    }

    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// True when no step failed, fully or partially
    pub fn is_complete(&self) -> bool {
        !self.steps.iter().any(|r| r.status.is_problem())
    }

    pub fn warnings(&self) -> impl Iterator<Item = (Step, &str)> {
        self.steps
            .iter()
            .flat_map(|r| r.warnings.iter().map(move |w| (r.step, w.as_str())))
    }
}
