//! Cluster credential resolution and scoping
//!
//! The kubeconfig is validated once, then attached explicitly to every
//! cluster-facing invocation made through a [`CredentialScope`]. The process
//! environment is never modified.

use crate::error::{CollectError, Result};
use crate::runner::{CommandSpec, KUBECONFIG_ENV};
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A kubeconfig that existed and was readable when resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCredential {
    path: PathBuf,
}

impl ClusterCredential {
    /// Check existence, then read permission
    pub fn resolve(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CollectError::CredentialNotFound(path.to_path_buf()));
        }

        // A directory opens fine on Linux but holds no credential
        if path.is_dir() {
            return Err(CollectError::CredentialUnreadable {
                path: path.to_path_buf(),
                source: io::Error::new(ErrorKind::InvalidInput, "is a directory"),
            });
        }

        // Opening is the only reliable read check (ACLs, root squash, SELinux)
        match File::open(path) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CollectError::CredentialNotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(CollectError::CredentialUnreadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        info!("Using kubeconfig {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin the window in which invocations carry the credential
    pub fn scope(&self) -> CredentialScope<'_> {
        debug!("Credential scope opened for {}", self.path.display());
        CredentialScope {
            credential: self,
            granted: 0,
        }
    }
}

/// Guard handing the credential to child processes until dropped
#[derive(Debug)]
pub struct CredentialScope<'a> {
    credential: &'a ClusterCredential,
    granted: usize,
}

impl CredentialScope<'_> {
    /// Attach the credential to one invocation
    pub fn authorize(&mut self, spec: CommandSpec) -> CommandSpec {
        self.granted += 1;
        spec.env(KUBECONFIG_ENV, self.credential.path.as_os_str())
    }

    /// Invocations that received the credential so far
    pub fn granted(&self) -> usize {
        self.granted
    }
}

impl Drop for CredentialScope<'_> {
    fn drop(&mut self) {
        debug!(
            "Credential scope closed for {} after {} invocation(s)",
            self.credential.path.display(),
            self.granted
        );
    }
}
