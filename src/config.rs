//! Engine configuration.

use std::os::fd::BorrowedFd;

use crate::sys;

/// Tunables for a watch session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem type names on which per-entry watches are skipped.
    ///
    /// On these filesystems vnode notification for directory entries is
    /// unreliable or descriptors are too costly, so only the root of a
    /// directory watch is armed and entry churn is still reported via the
    /// listing diff.
    pub skip_subfiles_fs: Vec<String>,
    /// Capacity of the delivered-event channel before overflow kicks in.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_subfiles_fs: ["nfs", "smbfs", "cifs", "fusefs", "fuseblk", "procfs", "devfs"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            event_capacity: 1024,
        }
    }
}

impl Config {
    /// Whether the filesystem holding `fd` should skip per-entry watches.
    pub fn wants_skip_subfiles(&self, fd: BorrowedFd<'_>) -> bool {
        match sys::fs_type_name(fd) {
            Some(name) => self.skip_subfiles_fs.iter().any(|s| *s == name),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn local_tempdir_does_not_skip_subfiles() {
        let dir = tempfile::tempdir().unwrap();
        let fd = crate::sys::watch_open(
            None,
            dir.path().as_os_str(),
            crate::events::EventMask::empty(),
        )
        .unwrap();
        let cfg = Config::default();
        // Test directories live on a local filesystem.
        assert!(!cfg.wants_skip_subfiles(fd.as_fd()));
    }

    #[test]
    fn default_lists_network_filesystems() {
        let cfg = Config::default();
        assert!(cfg.skip_subfiles_fs.iter().any(|s| s == "nfs"));
        assert!(cfg.event_capacity > 0);
    }
}
