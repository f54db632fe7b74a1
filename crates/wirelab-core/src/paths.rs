//! Lab directory layout.
//!
//! Every lab owns a `clab-<name>` directory holding inventory and export
//! files plus a per-node state subdirectory. The parent directory defaults
//! to the current working directory and can be overridden with
//! `CLAB_LABDIR_BASE`.

use std::path::{Path, PathBuf};

/// Environment variable overriding the parent of the lab directory.
pub const LABDIR_BASE_ENV: &str = "CLAB_LABDIR_BASE";

/// Paths inside a lab's state directory.
#[derive(Debug, Clone)]
pub struct LabDirectory {
    root: PathBuf,
}

impl LabDirectory {
    /// Resolves the directory for a lab name, honouring `CLAB_LABDIR_BASE`.
    pub fn new(lab_name: &str) -> Self {
        let base = std::env::var(LABDIR_BASE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            root: base.join(format!("clab-{}", lab_name)),
        }
    }

    /// Creates a lab directory rooted at an explicit base path.
    pub fn with_base(base: impl Into<PathBuf>, lab_name: &str) -> Self {
        Self {
            root: base.into().join(format!("clab-{}", lab_name)),
        }
    }

    /// The `clab-<lab>` root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-node state directory.
    pub fn node_dir(&self, short_name: &str) -> PathBuf {
        self.root.join(short_name)
    }

    /// Ansible inventory file.
    pub fn ansible_inventory(&self) -> PathBuf {
        self.root.join("ansible-inventory.yml")
    }

    /// Topology data export file.
    pub fn topology_data(&self) -> PathBuf {
        self.root.join("topology-data.json")
    }

    /// Collected public keys injected into node configurations.
    pub fn authorized_keys(&self) -> PathBuf {
        self.root.join("authorized_keys")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dir = LabDirectory::with_base("/tmp/labs", "demo");
        assert_eq!(dir.root(), Path::new("/tmp/labs/clab-demo"));
        assert_eq!(dir.node_dir("r1"), Path::new("/tmp/labs/clab-demo/r1"));
        assert_eq!(
            dir.topology_data(),
            Path::new("/tmp/labs/clab-demo/topology-data.json")
        );
        assert_eq!(
            dir.authorized_keys(),
            Path::new("/tmp/labs/clab-demo/authorized_keys")
        );
    }
}
