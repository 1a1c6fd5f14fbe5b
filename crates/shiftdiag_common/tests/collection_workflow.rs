//! End-to-end collection runs against a scripted cluster
//!
//! The fake runner stands in for `oc` and the bundle generator, writing the
//! same kind of files they would so the workspace layout can be checked.

use chrono::{TimeZone, Utc};
use flate2::read::GzDecoder;
use shiftdiag_common::config::ShiftdiagConfig;
use shiftdiag_common::runner::KUBECONFIG_ENV;
use shiftdiag_common::summary::{Step, StepStatus};
use shiftdiag_common::{
    CollectError, CollectOptions, Collector, CommandOutput, CommandRunner, CommandSpec,
};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

struct FakeCluster {
    namespaces: Vec<&'static str>,
    failing: Vec<&'static str>,
    list_fails: bool,
    generator_installed: bool,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeCluster {
    fn new(namespaces: &[&'static str]) -> Self {
        Self {
            namespaces: namespaces.to_vec(),
            failing: Vec::new(),
            list_fails: false,
            generator_installed: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls().into_iter().filter(|c| c.program == program).collect()
    }

    fn ok(stdout: String) -> io::Result<CommandOutput> {
        Ok(CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    fn fail(stderr: &str) -> io::Result<CommandOutput> {
        Ok(CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

impl CommandRunner for FakeCluster {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        match (spec.program.as_str(), spec.args.first().map(String::as_str)) {
            ("oc", Some("get")) => {
                if self.list_fails {
                    return Self::fail("Unable to connect to the server: dial tcp 10.0.0.1:6443");
                }
                Self::ok(self.namespaces.join(" "))
            }
            ("oc", Some("adm")) => {
                let ns = spec.args[2].trim_start_matches("ns/");
                let dest = PathBuf::from(spec.args[3].trim_start_matches("--dest-dir="));
                if self.failing.contains(&ns) {
                    fs::create_dir_all(&dest).unwrap();
                    fs::write(dest.join("partial.log"), b"gathering").unwrap();
                    return Self::fail("error: namespaces is forbidden");
                }
                let data = dest.join("namespaces").join(ns).join("core");
                fs::create_dir_all(&data).unwrap();
                fs::write(data.join("pods.yaml"), format!("namespace: {}\n", ns)).unwrap();
                Self::ok(format!("Wrote inspect data to {}.\n", dest.display()))
            }
            ("microshift-sos-report", _) => {
                if !self.generator_installed {
                    return Err(io::Error::from(io::ErrorKind::NotFound));
                }
                let tmp = PathBuf::from(&spec.args[1]);
                fs::write(tmp.join("sosreport-microshift-edge-01-2023.tar.xz"), b"bundle").unwrap();
                Self::ok(String::new())
            }
            _ => Self::fail("unexpected command"),
        }
    }
}

struct Env {
    dir: TempDir,
    config: ShiftdiagConfig,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let kubeconfig = dir.path().join("kubeconfig");
        fs::write(&kubeconfig, b"apiVersion: v1\nkind: Config\n").unwrap();
        let tmp = dir.path().join("scratch");
        fs::create_dir(&tmp).unwrap();

        let mut config = ShiftdiagConfig::default();
        config.base_dir = dir.path().join("diagnostics");
        config.kubeconfig = kubeconfig;
        config.bundle.tmp_dir = tmp;
        Self { dir, config }
    }

    fn workspace(&self) -> PathBuf {
        self.config.base_dir.join("20231114221320")
    }
}

fn started() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn top_level_entries(archive: &Path) -> BTreeSet<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path().unwrap().to_string_lossy().into_owned();
            path.split('/').next().unwrap().to_string()
        })
        .collect()
}

#[test]
fn test_end_to_end_filters_inspects_and_archives() {
    let env = Env::new();
    let cluster = FakeCluster::new(&["kube-system", "app1", "app2", "default"]);

    let summary = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap();

    let inspected: Vec<&str> = summary.namespaces.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(inspected, vec!["app1", "app2"]);
    assert_eq!(cluster.calls_to("oc").len(), 3);
    assert!(summary.is_complete());

    let ws = env.workspace();
    assert_eq!(summary.workspace, ws);
    assert_eq!(
        summary.artifacts.bundle,
        Some(ws.join("sosreport-microshift-edge-01-2023.tar.xz"))
    );
    let archive = summary.artifacts.archive.clone().unwrap();
    assert_eq!(archive, ws.join("oc_adm_inspect_reports_20231114221320.tar.gz"));
    assert_eq!(
        top_level_entries(&archive),
        BTreeSet::from(["app1".to_string(), "app2".to_string()])
    );

    // Every cluster-facing call carried the credential explicitly
    for call in cluster.calls() {
        assert_eq!(
            call.env_value(KUBECONFIG_ENV).map(|v| PathBuf::from(v)),
            Some(env.config.kubeconfig.clone()),
            "{} ran without credential",
            call.display()
        );
    }
}

#[test]
fn test_one_failing_namespace_does_not_stop_the_run() {
    let env = Env::new();
    let mut cluster = FakeCluster::new(&["app1", "app2"]);
    cluster.failing = vec!["app1"];

    let summary = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap();

    let inspection = summary.step(Step::Inspection).unwrap();
    assert_eq!(inspection.status, StepStatus::Partial);
    assert!(inspection.warnings[0].contains("ns/app1"));
    assert!(!summary.is_complete());

    assert!(!env.workspace().join("app1").exists());
    let archive = summary.artifacts.archive.clone().unwrap();
    assert_eq!(top_level_entries(&archive), BTreeSet::from(["app2".to_string()]));
}

#[test]
fn test_no_application_namespaces_skips_archive() {
    let env = Env::new();
    let cluster = FakeCluster::new(&["default", "kube-system", "openshift-dns"]);

    let summary = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap();

    assert!(summary.namespaces.is_empty());
    assert_eq!(summary.step(Step::Inspection).unwrap().status, StepStatus::Skipped);
    assert_eq!(summary.step(Step::Archive).unwrap().status, StepStatus::Skipped);
    assert!(summary.artifacts.archive.is_none());

    let leftovers: Vec<_> = fs::read_dir(env.workspace())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["sosreport-microshift-edge-01-2023.tar.xz".to_string()]);
}

#[test]
fn test_missing_kubeconfig_is_fatal_and_touches_nothing() {
    let mut env = Env::new();
    env.config.kubeconfig = env.dir.path().join("resources").join("kubeconfig");
    let cluster = FakeCluster::new(&["app1"]);

    let err = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap_err();

    assert!(matches!(err, CollectError::CredentialNotFound(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(cluster.calls().is_empty());
    assert!(!env.workspace().exists());
}

#[test]
fn test_rerun_into_workspace_with_bundle_skips_generator() {
    let env = Env::new();
    let ws = env.workspace();
    fs::create_dir_all(&ws).unwrap();
    fs::write(ws.join("sosreport-microshift-edge-01-earlier.tar.xz"), b"bundle").unwrap();
    let cluster = FakeCluster::new(&["app1"]);

    let options = CollectOptions {
        workspace: Some(ws.clone()),
        skip_bundle: false,
    };
    let summary = Collector::new(&env.config, &cluster)
        .run(&options, &started())
        .unwrap();

    let bundle = summary.step(Step::Bundle).unwrap();
    assert_eq!(bundle.status, StepStatus::Skipped);
    assert!(bundle.detail.contains("already present"));
    assert!(cluster.calls_to("microshift-sos-report").is_empty());

    // The old bundle stays out of the aggregate archive
    let archive = summary.artifacts.archive.clone().unwrap();
    assert_eq!(top_level_entries(&archive), BTreeSet::from(["app1".to_string()]));
}

#[test]
fn test_failed_rerun_keeps_earlier_namespace_output() {
    let env = Env::new();
    let ws = env.workspace();
    let earlier = ws.join("app1").join("namespaces").join("app1").join("pods.yaml");
    fs::create_dir_all(earlier.parent().unwrap()).unwrap();
    fs::write(&earlier, b"namespace: app1\n").unwrap();
    let mut cluster = FakeCluster::new(&["app1", "app2"]);
    cluster.failing = vec!["app1"];

    let options = CollectOptions {
        workspace: Some(ws.clone()),
        skip_bundle: true,
    };
    let summary = Collector::new(&env.config, &cluster)
        .run(&options, &started())
        .unwrap();

    let inspection = summary.step(Step::Inspection).unwrap();
    assert_eq!(inspection.status, StepStatus::Partial);
    assert_eq!(fs::read_to_string(&earlier).unwrap(), "namespace: app1\n");

    // The earlier namespace data still reaches the archive
    let archive = summary.artifacts.archive.clone().unwrap();
    assert_eq!(
        top_level_entries(&archive),
        BTreeSet::from(["app1".to_string(), "app2".to_string()])
    );
}

#[test]
fn test_missing_generator_is_only_a_warning() {
    let env = Env::new();
    let mut cluster = FakeCluster::new(&["app1"]);
    cluster.generator_installed = false;

    let summary = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap();

    let bundle = summary.step(Step::Bundle).unwrap();
    assert_eq!(bundle.status, StepStatus::Failed);
    assert!(bundle.warnings[0].contains("command not found"));
    assert!(summary.artifacts.archive.is_some());
}

#[test]
fn test_unreachable_cluster_skips_inspection_and_archive() {
    let env = Env::new();
    let mut cluster = FakeCluster::new(&["app1"]);
    cluster.list_fails = true;

    let summary = Collector::new(&env.config, &cluster)
        .run(&CollectOptions::default(), &started())
        .unwrap();

    assert_eq!(summary.step(Step::Namespaces).unwrap().status, StepStatus::Failed);
    assert_eq!(summary.step(Step::Inspection).unwrap().status, StepStatus::Skipped);
    assert_eq!(summary.step(Step::Archive).unwrap().status, StepStatus::Skipped);
    assert_eq!(cluster.calls_to("oc").len(), 1);
}

#[test]
fn test_skip_bundle_option() {
    let env = Env::new();
    let cluster = FakeCluster::new(&["app1"]);

    let options = CollectOptions {
        workspace: None,
        skip_bundle: true,
    };
    let summary = Collector::new(&env.config, &cluster)
        .run(&options, &started())
        .unwrap();

    assert_eq!(summary.step(Step::Bundle).unwrap().detail, "skipped by request");
    assert!(cluster.calls_to("microshift-sos-report").is_empty());
}
