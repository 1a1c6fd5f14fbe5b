//! Per-run workspace directory
//!
//! A workspace is `<base>/<timestamp>`; the timestamp has second granularity,
//! so two runs started in the same second share a directory.

use crate::error::{CollectError, Result};
use chrono::{DateTime, TimeZone};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Format of the workspace directory name and archive suffix
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    timestamp: String,
    fresh: bool,
}

impl Workspace {
    /// Create `<base>/<timestamp>` for a run started at `now`
    pub fn prepare<Tz: TimeZone>(base: &Path, now: &DateTime<Tz>) -> Result<Self>
    where
        Tz::Offset: std::fmt::Display,
    {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let root = base.join(&timestamp);
        let existed = root.is_dir();

        fs::create_dir_all(&root).map_err(|source| CollectError::WorkspaceCreate {
            path: root.clone(),
            source,
        })?;

        if existed {
            warn!("Workspace {} already exists, reusing it", root.display());
        } else {
            info!("Created workspace {}", root.display());
        }

        Ok(Self {
            root,
            timestamp,
            fresh: !existed,
        })
    }

    /// Reuse an existing workspace; its directory name is the timestamp
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(CollectError::WorkspaceMissing(path.to_path_buf()));
        }
        let timestamp = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CollectError::WorkspaceMissing(path.to_path_buf()))?;

        info!("Reusing workspace {}", path.display());
        Ok(Self {
            root: path.to_path_buf(),
            timestamp,
            fresh: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Whether this run created the directory
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn is_empty(&self) -> std::io::Result<bool> {
        Ok(fs::read_dir(&self.root)?.next().is_none())
    }

    /// Remove the directory if this run created it and nothing was written
    pub fn discard_if_empty(&self) {
        if !self.fresh {
            return;
        }
        match self.is_empty() {
            Ok(true) => match fs::remove_dir(&self.root) {
                Ok(()) => debug!("Removed empty workspace {}", self.root.display()),
                Err(e) => warn!("Could not remove empty workspace {}: {}", self.root.display(), e),
            },
            Ok(false) => {}
            Err(e) => warn!("Could not inspect workspace {}: {}", self.root.display(), e),
        }
    }

    /// Top-level directories, sorted by name
    pub fn top_level_dirs(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Top-level regular files whose name matches `pattern`, sorted by name
    pub fn files_matching(&self, pattern: &Pattern) -> std::io::Result<Vec<PathBuf>> {
        files_matching(&self.root, pattern)
    }
}

/// Regular files directly inside `dir` whose name matches `pattern`
pub fn files_matching(dir: &Path, pattern: &Pattern) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if pattern.matches(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
