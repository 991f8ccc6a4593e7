//! Low-level watches: one open descriptor per distinct inode.
//!
//! A user watch on a directory fans out into several of these, one for the
//! directory itself and one per entry. Each low-level watch tracks the set
//! of reasons it exists (its dependents); when that set drains, the watch
//! can be dropped and dropping it closes the descriptor, which also
//! unregisters it from the event queue.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use crate::backend::{VnodeBackend, WatchToken};
use crate::filter::{FileKind, FilterFlags};

/// Role of a low-level watch within its user watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// The watched path itself.
    Root,
    /// A directory entry under a watched directory.
    Dependent,
}

/// One reason a low-level watch is alive.
///
/// The root watch carries a [`Dependent::Sentinel`] so it survives even
/// when entry-level dependents come and go; entry watches carry the entry
/// names that currently resolve to their inode. Hard links make multiple
/// names per inode normal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dependent {
    Sentinel,
    Entry(OsString),
}

/// An open descriptor armed (or armable) on the event queue.
#[derive(Debug)]
pub struct Watch {
    fd: OwnedFd,
    kind: WatchKind,
    dev: u64,
    ino: u64,
    file_kind: FileKind,
    armed: FilterFlags,
    deps: BTreeSet<Dependent>,
}

impl Watch {
    /// Wrap an already-open descriptor. Arming is a separate step so a
    /// registration failure can be handled without losing the descriptor.
    pub fn new(fd: OwnedFd, kind: WatchKind, dev: u64, ino: u64, file_kind: FileKind) -> Self {
        Self {
            fd,
            kind,
            dev,
            ino,
            file_kind,
            armed: FilterFlags::empty(),
            deps: BTreeSet::new(),
        }
    }

    /// Register (or re-register) this watch with the event queue.
    pub fn arm<B: VnodeBackend>(
        &mut self,
        backend: &B,
        token: WatchToken,
        fflags: FilterFlags,
    ) -> io::Result<()> {
        backend.arm(self.fd.as_fd(), token, fflags)?;
        self.armed = fflags;
        Ok(())
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    pub fn armed(&self) -> FilterFlags {
        self.armed
    }

    pub fn add_dep(&mut self, dep: Dependent) {
        self.deps.insert(dep);
    }

    /// Remove a dependent; returns true when it was present.
    pub fn del_dep(&mut self, dep: &Dependent) -> bool {
        self.deps.remove(dep)
    }

    /// Relabel a dependent in place, as happens on a rename within the
    /// watched directory.
    pub fn chg_dep(&mut self, from: &Dependent, to: Dependent) -> bool {
        if self.deps.remove(from) {
            self.deps.insert(to);
            true
        } else {
            false
        }
    }

    pub fn has_dep(&self, dep: &Dependent) -> bool {
        self.deps.contains(dep)
    }

    pub fn deps_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn dep_count(&self) -> usize {
        self.deps.len()
    }

    pub fn deps(&self) -> impl Iterator<Item = &Dependent> {
        self.deps.iter()
    }
}
