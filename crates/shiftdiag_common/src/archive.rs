//! Aggregate archive of inspection output
//!
//! Packs every top-level directory of the workspace into
//! `<prefix>_<timestamp>.tar.gz`. Bundle archives and earlier aggregate
//! archives are skipped wherever they sit, so an archive never contains
//! itself or a second copy of the bundle.

use crate::summary::{Step, StepReport};
use crate::workspace::Workspace;
use flate2::write::GzEncoder;
use flate2::Compression;
use glob::Pattern;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn archive_name(prefix: &str, timestamp: &str) -> String {
    format!("{}_{}.tar.gz", prefix, timestamp)
}

/// Pattern matching any aggregate archive with this prefix
pub fn aggregate_pattern(prefix: &str) -> Pattern {
    // An escaped prefix always parses
    Pattern::new(&format!("{}_*.tar.gz", Pattern::escape(prefix))).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub report: StepReport,
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct PackStats {
    roots: usize,
    files: usize,
    excluded: Vec<PathBuf>,
}

pub struct Archiver {
    prefix: String,
    exclusions: Vec<Pattern>,
}

impl Archiver {
    pub fn new(prefix: &str, bundle_pattern: Pattern) -> Self {
        Self {
            prefix: prefix.to_string(),
            exclusions: vec![bundle_pattern, aggregate_pattern(prefix)],
        }
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclusions.iter().any(|p| p.matches(name))
    }

    pub fn create(&self, workspace: &Workspace) -> ArchiveOutcome {
        let roots = match workspace.top_level_dirs() {
            Ok(roots) => roots,
            Err(e) => return failed(format!("cannot list workspace: {}", e)),
        };
        if roots.is_empty() {
            info!("No inspection directories to archive");
            return ArchiveOutcome {
                report: StepReport::skipped(Step::Archive, "no inspection directories"),
                archive: None,
            };
        }

        let name = archive_name(&self.prefix, workspace.timestamp());
        let dest = workspace.join(&name);
        let partial = workspace.join(&format!("{}.partial", name));

        match self.write(workspace.root(), &roots, &partial) {
            Ok(stats) => {
                if let Err(e) = fs::rename(&partial, &dest) {
                    let _ = fs::remove_file(&partial);
                    return failed(format!("cannot finalize {}: {}", dest.display(), e));
                }
                for path in &stats.excluded {
                    debug!("Excluded {} from archive", path.display());
                }
                info!(
                    "Archived {} director(ies), {} file(s) into {}",
                    stats.roots,
                    stats.files,
                    dest.display()
                );
                ArchiveOutcome {
                    report: StepReport::succeeded(
                        Step::Archive,
                        format!("{} ({} directories)", name, stats.roots),
                    ),
                    archive: Some(dest),
                }
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                failed(format!(
                    "cannot write {}: {}; inspection directories left uncompressed",
                    dest.display(),
                    e
                ))
            }
        }
    }

    fn write(&self, base: &Path, roots: &[PathBuf], dest: &Path) -> io::Result<PackStats> {
        let file = File::create(dest)?;
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);

        let mut stats = PackStats::default();
        for root in roots {
            stats.roots += 1;
            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                let rel = path
                    .strip_prefix(base)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

                if entry.file_type().is_dir() {
                    builder.append_dir(rel, path)?;
                    continue;
                }
                if self.is_excluded(&entry.file_name().to_string_lossy()) {
                    stats.excluded.push(path.to_path_buf());
                    continue;
                }
                builder.append_path_with_name(path, rel)?;
                stats.files += 1;
            }
        }

        let encoder = builder.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;
        Ok(stats)
    }
}

fn failed(warning: String) -> ArchiveOutcome {
    warn!("Archiving failed: {}", warning);
    ArchiveOutcome {
        report: StepReport::failed(Step::Archive, warning),
        archive: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::StepStatus;
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn workspace(base: &Path) -> Workspace {
        Workspace::prepare(base, &Utc.timestamp_opt(1_700_000_000, 0).unwrap()).unwrap()
    }

    fn archiver() -> Archiver {
        Archiver::new(
            "oc_adm_inspect_reports",
            Pattern::new("sosreport-*.tar.xz").unwrap(),
        )
    }

    fn entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_archive_name_format() {
        assert_eq!(
            archive_name("oc_adm_inspect_reports", "20231114221320"),
            "oc_adm_inspect_reports_20231114221320.tar.gz"
        );
        let pattern = aggregate_pattern("oc_adm_inspect_reports");
        assert!(pattern.matches("oc_adm_inspect_reports_20231114221320.tar.gz"));
        assert!(!pattern.matches("sosreport-x.tar.xz"));
    }

    #[test]
    fn test_archive_holds_each_namespace_directory() {
        let base = TempDir::new().unwrap();
        let ws = workspace(base.path());
        for ns in ["app1", "app2"] {
            fs::create_dir_all(ws.join(ns).join("namespaces").join(ns)).unwrap();
            fs::write(ws.join(ns).join("timestamp"), b"2023").unwrap();
        }
        fs::write(ws.join("sosreport-microshift-edge.tar.xz"), b"bundle").unwrap();

        let outcome = archiver().create(&ws);
        assert_eq!(outcome.report.status, StepStatus::Succeeded);
        let archive = outcome.archive.unwrap();
        assert_eq!(
            archive,
            ws.join("oc_adm_inspect_reports_20231114221320.tar.gz")
        );
        assert!(!ws.join("oc_adm_inspect_reports_20231114221320.tar.gz.partial").exists());

        let listed = entries(&archive);
        let top: BTreeSet<String> = listed
            .iter()
            .map(|p| p.split('/').next().unwrap().to_string())
            .collect();
        assert_eq!(top, BTreeSet::from(["app1".to_string(), "app2".to_string()]));
        assert!(listed.iter().any(|p| p == "app1/timestamp"));
    }

    #[test]
    fn test_archive_skips_bundles_and_earlier_archives() {
        let base = TempDir::new().unwrap();
        let ws = workspace(base.path());
        fs::create_dir(ws.join("app1")).unwrap();
        fs::write(ws.join("app1").join("pods.yaml"), b"kind: List").unwrap();
        fs::write(ws.join("app1").join("sosreport-stray.tar.xz"), b"bundle").unwrap();
        fs::write(
            ws.join("app1").join("oc_adm_inspect_reports_20200101000000.tar.gz"),
            b"old",
        )
        .unwrap();

        let outcome = archiver().create(&ws);
        let listed = entries(&outcome.archive.unwrap());

        assert!(listed.iter().any(|p| p == "app1/pods.yaml"));
        assert!(!listed.iter().any(|p| p.contains("sosreport-")));
        assert!(!listed.iter().any(|p| p.contains("oc_adm_inspect_reports_")));
    }

    #[test]
    fn test_no_directories_means_no_archive() {
        let base = TempDir::new().unwrap();
        let ws = workspace(base.path());
        fs::write(ws.join("sosreport-microshift-edge.tar.xz"), b"bundle").unwrap();

        let outcome = archiver().create(&ws);
        assert_eq!(outcome.report.status, StepStatus::Skipped);
        assert!(outcome.archive.is_none());
        assert!(!ws.join("oc_adm_inspect_reports_20231114221320.tar.gz").exists());
    }
}
