//! Network-namespace entry and symlink management.
//!
//! Namespace entry is scoped: [`NetnsGuard::enter`] saves the calling
//! thread's current netns and restores it on drop, so the thread cannot
//! leak into the target namespace on any exit path. Netlink work inside a
//! namespace goes through [`ns_handle`], which binds a fresh rtnetlink
//! socket while the guard is held and releases the guard before any await
//! point.

use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::sched::{setns, CloneFlags};
use rtnetlink::Handle;
use tracing::debug;

use crate::error::Result;

/// Directory where named network namespaces are exposed for `ip netns`.
pub const NETNS_DIR: &str = "/run/netns";

/// Path of the calling thread's own network namespace.
const SELF_NS: &str = "/proc/self/ns/net";

/// Scoped entry into a network namespace.
///
/// The calling thread joins the target namespace on construction and
/// rejoins its original namespace when the guard is dropped.
#[derive(Debug)]
pub struct NetnsGuard {
    prev: File,
}

impl NetnsGuard {
    /// Enters the namespace at `ns_path`.
    pub fn enter(ns_path: &str) -> Result<Self> {
        let prev = File::open(SELF_NS)?;
        let target = File::open(ns_path)?;
        setns(target.as_fd(), CloneFlags::CLONE_NEWNET)?;
        debug!(ns = %ns_path, "entered network namespace");
        Ok(Self { prev })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(err) = setns(self.prev.as_fd(), CloneFlags::CLONE_NEWNET) {
            // nothing sensible to do beyond recording it
            tracing::error!(error = %err, "failed to restore network namespace");
        }
    }
}

/// Opens an rtnetlink handle bound to the namespace at `ns_path`, or to
/// the host namespace when `ns_path` is `None`.
///
/// The namespace guard is released before this function returns; the
/// returned handle keeps operating on the target namespace because the
/// underlying socket was created inside it.
pub fn ns_handle(ns_path: Option<&str>) -> Result<Handle> {
    let _guard = match ns_path {
        Some(path) => Some(NetnsGuard::enter(path)?),
        None => None,
    };
    let (connection, handle, _) = rtnetlink::new_connection()?;
    tokio::spawn(connection);
    Ok(handle)
}

/// Runs a closure with the calling thread inside the namespace at
/// `ns_path` (host namespace when `None`). The namespace is restored
/// before this function returns.
pub fn in_netns<T>(ns_path: Option<&str>, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let _guard = match ns_path {
        Some(path) => Some(NetnsGuard::enter(path)?),
        None => None,
    };
    f()
}

/// Exposes a container's network namespace under [`NETNS_DIR`] so that
/// `ip netns exec` and the namespace helpers can reference it by the
/// container's long name.
pub fn symlink_netns(ns_path: &str, long_name: &str) -> Result<()> {
    symlink_netns_in(Path::new(NETNS_DIR), ns_path, long_name)
}

/// Removes the named-namespace symlink for a container. Missing links are
/// not an error.
pub fn unlink_netns(long_name: &str) -> Result<()> {
    unlink_netns_in(Path::new(NETNS_DIR), long_name)
}

/// Returns the named-namespace path for a container long name.
pub fn named_netns_path(long_name: &str) -> PathBuf {
    Path::new(NETNS_DIR).join(long_name)
}

fn symlink_netns_in(dir: &Path, ns_path: &str, long_name: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let link = dir.join(long_name);
    // replace a stale symlink left behind by a previous run
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(&link)?;
    }
    std::os::unix::fs::symlink(ns_path, &link)?;
    debug!(ns = %ns_path, name = %long_name, "linked network namespace");
    Ok(())
}

fn unlink_netns_in(dir: &Path, long_name: &str) -> Result<()> {
    let link = dir.join(long_name);
    match std::fs::remove_file(&link) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symlink_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        symlink_netns_in(dir.path(), "/proc/1/ns/net", "clab-demo-r1").unwrap();

        let link = dir.path().join("clab-demo-r1");
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("/proc/1/ns/net")
        );

        // re-linking replaces a stale entry
        symlink_netns_in(dir.path(), "/proc/2/ns/net", "clab-demo-r1").unwrap();
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("/proc/2/ns/net")
        );

        unlink_netns_in(dir.path(), "clab-demo-r1").unwrap();
        assert!(!link.exists());

        // second unlink is a no-op
        unlink_netns_in(dir.path(), "clab-demo-r1").unwrap();
    }

    #[test]
    fn test_named_netns_path() {
        assert_eq!(
            named_netns_path("clab-demo-r1"),
            PathBuf::from("/run/netns/clab-demo-r1")
        );
    }
}
