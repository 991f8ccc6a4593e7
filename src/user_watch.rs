//! User watches: one watched path, fanned out over low-level watches.
//!
//! A user watch on a file owns exactly one descriptor. On a directory it
//! owns one descriptor for the directory itself plus one per entry, shared
//! across hard links by inode. The directory keeps a sorted snapshot of its
//! entries; when the directory reports a write the snapshot is diffed
//! against a fresh listing and the low-level watches are reconciled to
//! match.

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;

use crate::backend::{VnodeBackend, WatchToken};
use crate::config::Config;
use crate::deps::{DepDelta, DepItem, DepList};
use crate::error::{Result, WatchError};
use crate::events::{EventMask, WatchId};
use crate::filter::{self, FileKind};
use crate::sys::{self, FileInfo};
use crate::watch::{Dependent, Watch, WatchKind};
use crate::watch_set::WatchSet;

/// Outcome of resolving one directory entry to a low-level watch.
enum Resolution {
    /// An existing watch on this inode gains a dependent (hard link).
    Hold(u64),
    /// A fresh descriptor was opened and identified.
    Tracked(OwnedFd, FileInfo),
    /// No descriptor is needed for this entry under the current mask.
    NotNeeded,
    /// The entry could not be opened; only its metadata is tracked.
    Degraded,
}

/// A single watched path as requested by the caller.
#[derive(Debug)]
pub struct UserWatch {
    wd: WatchId,
    mask: EventMask,
    dev: u64,
    ino: u64,
    root_kind: FileKind,
    closed: bool,
    /// Per-entry watches are skipped on filesystems where they are
    /// unreliable; entry churn is still reported via the listing diff.
    skip_subfiles: bool,
    deps: DepList,
    watches: WatchSet,
}

impl UserWatch {
    /// Open a path for watching, honoring the open-time mask flags.
    pub fn open(path: &Path, mask: EventMask) -> Result<OwnedFd> {
        sys::watch_open(None, path.as_os_str(), mask).map_err(|err| {
            if mask.contains(EventMask::IN_ONLYDIR)
                && err.raw_os_error() == Some(libc::ENOTDIR)
            {
                WatchError::NotDirectory(path.to_path_buf())
            } else {
                WatchError::Io(err)
            }
        })
    }

    /// Build the watch around an already-open descriptor: identify it, arm
    /// the root, snapshot the listing and fan out over the entries.
    ///
    /// A failure to identify or arm the root is fatal; failures on
    /// individual entries degrade that entry only.
    pub fn init<B: VnodeBackend>(
        backend: &B,
        wd: WatchId,
        fd: OwnedFd,
        mask: EventMask,
        config: &Config,
    ) -> Result<Self> {
        let info = sys::stat_fd(fd.as_fd())?;
        let is_dir = info.kind.is_dir();
        let skip_subfiles = is_dir && config.wants_skip_subfiles(fd.as_fd());
        let deps = if is_dir {
            DepList::listing(fd.as_fd())?
        } else {
            DepList::default()
        };

        let mut root = Watch::new(fd, WatchKind::Root, info.dev, info.ino, info.kind);
        root.add_dep(Dependent::Sentinel);
        let token = WatchToken { wd, ino: info.ino };
        root.arm(backend, token, filter::needed_fflags(mask, info.kind, false))?;

        let mut watches = WatchSet::new();
        watches.insert(root);

        let mut uw = Self {
            wd,
            mask,
            dev: info.dev,
            ino: info.ino,
            root_kind: info.kind,
            closed: false,
            skip_subfiles,
            deps,
            watches,
        };
        for idx in 0..uw.deps.len() {
            uw.add_subwatch(backend, idx);
        }
        Ok(uw)
    }

    /// Tear down every low-level watch. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let items: Vec<DepItem> = self.deps.iter().cloned().collect();
        for item in &items {
            self.del_subwatch(item);
        }
        self.deps.clear();
        self.watches.release_dep(self.ino, &Dependent::Sentinel);
    }

    /// Apply a new user mask, merging when `IN_MASK_ADD` is set.
    ///
    /// The root is re-armed and every entry is reconciled: watches whose
    /// entry no longer needs any filter bits are released, entries that now
    /// need one are opened late.
    pub fn update_flags<B: VnodeBackend>(&mut self, backend: &B, flags: EventMask) -> Result<()> {
        let merge = flags.contains(EventMask::IN_MASK_ADD);
        let mask = if merge {
            self.mask | (flags - EventMask::IN_MASK_ADD)
        } else {
            flags
        };
        self.mask = mask;

        let token = WatchToken {
            wd: self.wd,
            ino: self.ino,
        };
        if let Some(root) = self.watches.find_mut(self.ino) {
            let fflags = filter::translate(mask, self.root_kind, false, root.armed(), merge);
            root.arm(backend, token, fflags)?;
        }

        if self.skip_subfiles {
            return Ok(());
        }
        for idx in 0..self.deps.len() {
            let Some(item) = self.deps.get(idx).cloned() else {
                continue;
            };
            // The entry must actually be a dependent of the found watch: a
            // hard link resolved through a sibling has a live watch on its
            // inode without this name attached yet.
            match self.watches.find(item.inode) {
                Some(watch)
                    if item.inode != self.ino
                        && watch.has_dep(&Dependent::Entry(item.name.clone())) =>
                {
                    let want =
                        filter::translate(mask, watch.file_kind(), true, watch.armed(), merge);
                    if want.is_empty() {
                        self.del_subwatch(&item);
                    } else if want != watch.armed() {
                        let token = WatchToken {
                            wd: self.wd,
                            ino: item.inode,
                        };
                        if let Some(watch) = self.watches.find_mut(item.inode) {
                            if let Err(err) = watch.arm(backend, token, want) {
                                log::warn!(
                                    "failed to re-arm watch for {:?} under {}: {}",
                                    item.name,
                                    self.wd,
                                    err
                                );
                            }
                        }
                    }
                }
                _ => {
                    // No watch yet: the widened mask may need one now.
                    self.add_subwatch(backend, idx);
                }
            }
        }
        Ok(())
    }

    /// Give the entry at `idx` a low-level watch, sharing an existing one
    /// when the inode is already watched. Returns the inode now holding the
    /// entry as a dependent, or `None` when the entry stays unwatched.
    pub fn add_subwatch<B: VnodeBackend>(&mut self, backend: &B, idx: usize) -> Option<u64> {
        if self.closed {
            return None;
        }
        if self.skip_subfiles {
            self.resolve_metadata_only(idx);
            return None;
        }
        let name = self.deps.get(idx)?.name.clone();
        match self.resolve_entry(idx) {
            Resolution::Hold(ino) => {
                self.watches
                    .find_mut(ino)?
                    .add_dep(Dependent::Entry(name));
                Some(ino)
            }
            Resolution::Tracked(fd, info) => {
                let mut watch =
                    Watch::new(fd, WatchKind::Dependent, info.dev, info.ino, info.kind);
                watch.add_dep(Dependent::Entry(name.clone()));
                let token = WatchToken {
                    wd: self.wd,
                    ino: info.ino,
                };
                let fflags = filter::needed_fflags(self.mask, info.kind, true);
                if let Err(err) = watch.arm(backend, token, fflags) {
                    // Keep the watch; the descriptor still pins the inode
                    // and a later re-arm may succeed.
                    log::warn!(
                        "failed to arm watch for {:?} under {}: {}",
                        name,
                        self.wd,
                        err
                    );
                }
                self.watches.insert(watch);
                Some(info.ino)
            }
            Resolution::NotNeeded | Resolution::Degraded => None,
        }
    }

    /// Resolve one entry to a descriptor, handling the races between the
    /// listing and the open.
    fn resolve_entry(&mut self, idx: usize) -> Resolution {
        let (name, listed_ino, listed_kind) = match self.deps.get(idx) {
            Some(item) => (item.name.clone(), item.inode, item.kind),
            None => return Resolution::NotNeeded,
        };

        // When the listing already told us the type and the mask arms
        // nothing for it, skip the open entirely.
        if listed_kind != FileKind::Unknown
            && filter::needed_fflags(self.mask, listed_kind, true).is_empty()
        {
            return Resolution::NotNeeded;
        }

        // Hard link fast path: another name already holds this inode open.
        if listed_ino != self.ino && self.watches.find(listed_ino).is_some() {
            return Resolution::Hold(listed_ino);
        }

        let root_fd = match self.watches.find(self.ino) {
            Some(root) => root.fd(),
            None => return Resolution::NotNeeded,
        };
        // Entries are never followed: a symlink is watched as a symlink.
        let fd = match sys::watch_open(Some(root_fd), &name, EventMask::IN_DONT_FOLLOW) {
            Ok(fd) => fd,
            Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {
                // Gone between the listing and the open; the next listing
                // diff reports the removal.
                return Resolution::NotNeeded;
            }
            Err(err)
                if err.raw_os_error() == Some(libc::ELOOP)
                    || err.raw_os_error() == Some(libc::EMLINK) =>
            {
                self.resolve_metadata_only(idx);
                return Resolution::Degraded;
            }
            Err(err) => {
                log::warn!(
                    "cannot open entry {:?} under {}: {}",
                    name,
                    self.wd,
                    err
                );
                self.resolve_metadata_only(idx);
                return Resolution::Degraded;
            }
        };

        let mut info = match sys::stat_fd(fd.as_fd()) {
            Ok(info) => info,
            Err(err) => {
                log::warn!("cannot identify entry {:?} under {}: {}", name, self.wd, err);
                self.resolve_metadata_only(idx);
                return Resolution::Degraded;
            }
        };

        // Crossing onto another filesystem: the mounted root's inode is not
        // comparable to the parent's listing, so the listed inode stays the
        // authoritative identity. The descriptor is still tracked.
        if info.dev != self.dev {
            log::debug!("entry {:?} under {} crosses a mount boundary", name, self.wd);
            info.ino = listed_ino;
        }

        // The entry was replaced between the listing and the open. Track
        // what is actually there now.
        if info.ino != listed_ino {
            if let Some(item) = self.deps.get_mut(idx) {
                item.inode = info.ino;
                item.kind = info.kind;
            }
            if self.watches.find(info.ino).is_some() {
                return Resolution::Hold(info.ino);
            }
        }

        if let Some(item) = self.deps.get_mut(idx) {
            item.kind = info.kind;
        }

        // Nothing to arm for this entry under the current mask: learn the
        // type, give the descriptor back.
        if filter::needed_fflags(self.mask, info.kind, true).is_empty() {
            return Resolution::NotNeeded;
        }

        Resolution::Tracked(fd, info)
    }

    /// Learn an entry's identity without opening it.
    fn resolve_metadata_only(&mut self, idx: usize) {
        let name = match self.deps.get(idx) {
            Some(item) => item.name.clone(),
            None => return,
        };
        let Some(root) = self.watches.find(self.ino) else {
            return;
        };
        match sys::lstat_at(root.fd(), &name) {
            Ok(info) => {
                if let Some(item) = self.deps.get_mut(idx) {
                    item.inode = info.ino;
                    item.kind = info.kind;
                }
            }
            Err(err) => {
                log::debug!("cannot stat entry {:?} under {}: {}", name, self.wd, err);
            }
        }
    }

    /// Release the low-level watch dependent for a vanished entry.
    pub fn del_subwatch(&mut self, item: &DepItem) {
        self.watches
            .release_dep(item.inode, &Dependent::Entry(item.name.clone()));
    }

    /// Relabel a renamed entry's dependent without reopening anything.
    pub fn move_subwatch(&mut self, from: &DepItem, to: &DepItem) {
        debug_assert_eq!(from.inode, to.inode);
        if let Some(watch) = self.watches.find_mut(from.inode) {
            watch.chg_dep(
                &Dependent::Entry(from.name.clone()),
                Dependent::Entry(to.name.clone()),
            );
        }
    }

    /// Re-list the directory, reconcile the low-level watches and return
    /// the delta for event reporting.
    pub fn rescan<B: VnodeBackend>(&mut self, backend: &B) -> io::Result<DepDelta> {
        let root_fd = match self.watches.find(self.ino) {
            Some(root) => root.fd(),
            None => return Ok(DepDelta::default()),
        };
        let fresh = DepList::listing(root_fd)?;
        let delta = self.deps.diff(&fresh);

        for item in &delta.removed {
            self.del_subwatch(item);
        }
        for (from, to) in &delta.moved {
            self.move_subwatch(from, to);
        }
        self.deps.adopt(fresh);
        for item in &delta.added {
            if let Some(idx) = self.deps.position_by_name(&item.name) {
                self.add_subwatch(backend, idx);
            }
        }
        Ok(delta)
    }

    pub fn wd(&self) -> WatchId {
        self.wd
    }

    pub fn mask(&self) -> EventMask {
        self.mask
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn root_kind(&self) -> FileKind {
        self.root_kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn deps(&self) -> &DepList {
        &self.deps
    }

    pub fn watch(&self, ino: u64) -> Option<&Watch> {
        self.watches.find(ino)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::filter::FilterFlags;
    use std::ffi::OsStr;
    use std::os::fd::AsRawFd;

    fn init_watch(
        backend: &RecordingBackend,
        path: &Path,
        mask: EventMask,
    ) -> UserWatch {
        let fd = UserWatch::open(path, mask).unwrap();
        UserWatch::init(backend, WatchId::new(1), fd, mask, &Config::default()).unwrap()
    }

    #[test]
    fn directory_init_fans_out_over_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();
        let backend = RecordingBackend::new();
        let uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);

        // Root plus one watch per entry.
        assert_eq!(uw.watch_count(), 3);
        assert_eq!(uw.deps().len(), 2);
        let root = uw.watch(uw.ino()).unwrap();
        assert!(root.has_dep(&Dependent::Sentinel));
        assert_eq!(root.dep_count(), 1);
        // Entry watches never carry the sentinel.
        for w in [OsStr::new("a"), OsStr::new("b")] {
            let idx = uw.deps().position_by_name(w).unwrap();
            let item = uw.deps().get(idx).unwrap();
            let watch = uw.watch(item.inode).unwrap();
            assert!(!watch.has_dep(&Dependent::Sentinel));
            assert!(watch.has_dep(&Dependent::Entry(w.to_os_string())));
        }
    }

    #[test]
    fn file_watch_has_single_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"x").unwrap();
        let backend = RecordingBackend::new();
        let uw = init_watch(&backend, &path, EventMask::IN_ALL_EVENTS);
        assert_eq!(uw.watch_count(), 1);
        assert!(uw.deps().is_empty());
        assert!(!uw.root_kind().is_dir());
    }

    #[test]
    fn hard_links_share_one_watch_with_two_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, b"").unwrap();
        std::fs::hard_link(&a, dir.path().join("b")).unwrap();
        let backend = RecordingBackend::new();
        let uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);

        // Root plus exactly one shared entry watch.
        assert_eq!(uw.watch_count(), 2);
        let idx = uw.deps().position_by_name(OsStr::new("a")).unwrap();
        let ino = uw.deps().get(idx).unwrap().inode;
        let watch = uw.watch(ino).unwrap();
        assert_eq!(watch.dep_count(), 2);
        assert!(watch.has_dep(&Dependent::Entry("a".into())));
        assert!(watch.has_dep(&Dependent::Entry("b".into())));
    }

    #[test]
    fn rescan_reports_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);

        std::fs::remove_file(dir.path().join("old")).unwrap();
        std::fs::write(dir.path().join("new"), b"").unwrap();
        let delta = uw.rescan(&backend).unwrap();

        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.removed[0].name, "old");
        assert_eq!(delta.added.len(), 1);
        assert_eq!(delta.added[0].name, "new");
        assert_eq!(uw.deps().len(), 1);
        assert_eq!(uw.watch_count(), 2);
    }

    #[test]
    fn rescan_relabels_rename_without_reopening() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("before"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        let idx = uw.deps().position_by_name(OsStr::new("before")).unwrap();
        let ino = uw.deps().get(idx).unwrap().inode;
        let raw = uw.watch(ino).unwrap().fd().as_raw_fd();
        let arms_before = backend.records().len();

        std::fs::rename(dir.path().join("before"), dir.path().join("after")).unwrap();
        let delta = uw.rescan(&backend).unwrap();

        assert_eq!(delta.moved.len(), 1);
        assert!(delta.added.is_empty() && delta.removed.is_empty());
        let watch = uw.watch(ino).unwrap();
        // Same descriptor, relabeled dependent, no extra arm calls.
        assert_eq!(watch.fd().as_raw_fd(), raw);
        assert!(watch.has_dep(&Dependent::Entry("after".into())));
        assert!(!watch.has_dep(&Dependent::Entry("before".into())));
        assert_eq!(backend.records().len(), arms_before);
    }

    #[test]
    fn removed_entry_eviction_closes_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doomed"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        let idx = uw.deps().position_by_name(OsStr::new("doomed")).unwrap();
        let ino = uw.deps().get(idx).unwrap().inode;
        let raw = uw.watch(ino).unwrap().fd().as_raw_fd();

        std::fs::remove_file(dir.path().join("doomed")).unwrap();
        uw.rescan(&backend).unwrap();

        assert!(uw.watch(ino).is_none());
        let rc = unsafe { libc::fcntl(raw, libc::F_GETFD) };
        assert_eq!(rc, -1);
    }

    #[test]
    fn self_only_mask_keeps_no_entry_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();
        let backend = RecordingBackend::new();
        let uw = init_watch(&backend, dir.path(), EventMask::IN_DELETE_SELF);

        // Entry descriptors would arm nothing under this mask, so none are
        // retained; the type is still learned from the probe.
        assert_eq!(uw.watch_count(), 1);
        assert_eq!(uw.deps().len(), 2);
        for idx in 0..uw.deps().len() {
            assert_ne!(uw.deps().get(idx).unwrap().kind, FileKind::Unknown);
        }
    }

    #[test]
    fn update_flags_mask_add_merges() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_DELETE_SELF);
        assert_eq!(uw.watch_count(), 1);

        uw.update_flags(&backend, EventMask::IN_MODIFY | EventMask::IN_MASK_ADD)
            .unwrap();
        assert!(uw.mask().contains(EventMask::IN_DELETE_SELF));
        assert!(uw.mask().contains(EventMask::IN_MODIFY));
        // The widened mask opens the entry watch late.
        assert_eq!(uw.watch_count(), 2);

        // Applying the same merge again changes nothing.
        let count = uw.watch_count();
        let mask = uw.mask();
        uw.update_flags(&backend, EventMask::IN_MODIFY | EventMask::IN_MASK_ADD)
            .unwrap();
        assert_eq!(uw.watch_count(), count);
        assert_eq!(uw.mask(), mask);
    }

    #[test]
    fn update_flags_attaches_both_hard_link_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, b"").unwrap();
        std::fs::hard_link(&a, dir.path().join("b")).unwrap();
        let backend = RecordingBackend::new();
        // No entry descriptors under a self-only mask.
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_DELETE_SELF);
        assert_eq!(uw.watch_count(), 1);

        // Widening resolves one name into a fresh watch; the other name
        // must attach to it as a second dependent, not just re-arm it.
        uw.update_flags(&backend, EventMask::IN_MODIFY | EventMask::IN_MASK_ADD)
            .unwrap();
        assert_eq!(uw.watch_count(), 2);
        let idx = uw.deps().position_by_name(OsStr::new("a")).unwrap();
        let ino = uw.deps().get(idx).unwrap().inode;
        let watch = uw.watch(ino).unwrap();
        assert_eq!(watch.dep_count(), 2);
        assert!(watch.has_dep(&Dependent::Entry("a".into())));
        assert!(watch.has_dep(&Dependent::Entry("b".into())));
    }

    #[test]
    fn mount_point_entry_keeps_listed_identity() {
        use std::os::unix::fs::MetadataExt;

        let backend = RecordingBackend::new();
        let root = Path::new("/");
        let fd = UserWatch::open(root, EventMask::IN_ATTRIB).unwrap();
        let uw = UserWatch::init(
            &backend,
            WatchId::new(1),
            fd,
            EventMask::IN_ATTRIB,
            &Config::default(),
        )
        .unwrap();

        // Entries that live on another filesystem must still be watched,
        // indexed under the parent listing's inode.
        let mut boundary = 0;
        let mut watched = 0;
        for idx in 0..uw.deps().len() {
            let item = uw.deps().get(idx).unwrap();
            let meta = match std::fs::symlink_metadata(root.join(&item.name)) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_dir() || meta.dev() == uw.dev() {
                continue;
            }
            boundary += 1;
            if let Some(watch) = uw.watch(item.inode) {
                assert_ne!(watch.dev(), uw.dev());
                watched += 1;
            }
        }
        if boundary > 0 {
            assert!(watched > 0);
        }
    }

    #[test]
    fn update_flags_replace_narrows_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        assert_eq!(uw.watch_count(), 2);

        uw.update_flags(&backend, EventMask::IN_DELETE_SELF).unwrap();
        // Entry watch released; the sentinel keeps the root alive.
        assert_eq!(uw.watch_count(), 1);
        let root = uw.watch(uw.ino()).unwrap();
        assert!(root.has_dep(&Dependent::Sentinel));
        assert_eq!(root.dep_count(), 1);
        let rec = backend.last_for_ino(uw.ino()).unwrap();
        assert_eq!(
            rec.fflags,
            FilterFlags::NOTE_DELETE | FilterFlags::NOTE_REVOKE
        );
    }

    #[test]
    fn empty_mask_evicts_every_dependent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::write(dir.path().join("b"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        assert_eq!(uw.watch_count(), 3);

        uw.update_flags(&backend, EventMask::empty()).unwrap();
        assert_eq!(uw.watch_count(), 1);
        let root = uw.watch(uw.ino()).unwrap();
        assert_eq!(root.dep_count(), 1);
        assert!(root.has_dep(&Dependent::Sentinel));
        assert!(root.armed().is_empty());
    }

    #[test]
    fn symlink_entry_degrades_to_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target"), b"").unwrap();
        std::os::unix::fs::symlink("target", dir.path().join("link")).unwrap();
        let backend = RecordingBackend::new();
        let uw = init_watch(&backend, dir.path(), EventMask::IN_MODIFY | EventMask::IN_CREATE);

        let idx = uw.deps().position_by_name(OsStr::new("link")).unwrap();
        let item = uw.deps().get(idx).unwrap();
        // The type was learned even if the open was refused.
        assert_eq!(item.kind, FileKind::Symlink);
        // No descriptor is held for the symlink under a modify-only mask.
        assert!(uw.watch(item.inode).is_none());
    }

    #[test]
    fn close_is_idempotent_and_drops_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        let root_raw = uw.watch(uw.ino()).unwrap().fd().as_raw_fd();

        uw.close();
        assert!(uw.is_closed());
        assert_eq!(uw.watch_count(), 0);
        let rc = unsafe { libc::fcntl(root_raw, libc::F_GETFD) };
        assert_eq!(rc, -1);

        uw.close();
        assert_eq!(uw.watch_count(), 0);
    }

    #[test]
    fn same_name_replacement_is_delete_plus_create() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"one").unwrap();
        let backend = RecordingBackend::new();
        let mut uw = init_watch(&backend, dir.path(), EventMask::IN_ALL_EVENTS);
        let idx = uw.deps().position_by_name(OsStr::new("f")).unwrap();
        let old_ino = uw.deps().get(idx).unwrap().inode;

        std::fs::remove_file(dir.path().join("f")).unwrap();
        std::fs::write(dir.path().join("f"), b"two").unwrap();
        let delta = uw.rescan(&backend).unwrap();

        let idx = uw.deps().position_by_name(OsStr::new("f")).unwrap();
        let new_ino = uw.deps().get(idx).unwrap().inode;
        if new_ino != old_ino {
            assert_eq!(delta.removed.len(), 1);
            assert_eq!(delta.added.len(), 1);
            assert!(delta.moved.is_empty());
            assert!(uw.watch(old_ino).is_none());
            assert!(uw.watch(new_ino).is_some());
        }
    }
}
