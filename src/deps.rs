//! Directory entry snapshots and their diffs.
//!
//! A directory watch keeps a snapshot of the directory's entries, sorted by
//! name and keyed by inode. When the directory reports a write, a fresh
//! listing is taken and diffed against the snapshot; matching inodes that
//! changed name become moves, everything else becomes additions and
//! removals. Same-name entries whose inode changed are reported as a
//! removal plus an addition, which is what inode reuse looks like.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::BorrowedFd;

use crate::filter::FileKind;
use crate::sys;

/// One entry in a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepItem {
    pub name: OsString,
    pub inode: u64,
    pub kind: FileKind,
}

/// A sorted snapshot of a directory's entries.
#[derive(Debug, Clone, Default)]
pub struct DepList {
    items: Vec<DepItem>,
}

/// The difference between two snapshots of the same directory.
#[derive(Debug, Default)]
pub struct DepDelta {
    /// Entries present only in the fresh listing.
    pub added: Vec<DepItem>,
    /// Entries present only in the old snapshot.
    pub removed: Vec<DepItem>,
    /// Entries whose inode survived under a new name: `(old, new)`.
    pub moved: Vec<(DepItem, DepItem)>,
}

impl DepDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }
}

impl DepList {
    /// Snapshot the entries of an open directory.
    pub fn listing(dirfd: BorrowedFd<'_>) -> io::Result<Self> {
        let entries = sys::list_dir(dirfd)?;
        Ok(Self {
            items: entries
                .into_iter()
                .map(|e| DepItem {
                    name: e.name,
                    inode: e.inode,
                    kind: e.kind,
                })
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DepItem> {
        self.items.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&DepItem> {
        self.items.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut DepItem> {
        self.items.get_mut(idx)
    }

    pub fn position_by_name(&self, name: &OsStr) -> Option<usize> {
        // Items are kept sorted by name.
        self.items
            .binary_search_by(|it| it.name.as_os_str().cmp(name))
            .ok()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Diff this snapshot against a fresh listing.
    ///
    /// An entry counts as surviving only when both its name and inode match;
    /// leftovers on both sides are then paired by inode into moves, in
    /// sorted-name order so repeated renames report deterministically.
    pub fn diff(&self, fresh: &DepList) -> DepDelta {
        let old_by_name: HashMap<&OsStr, &DepItem> = self
            .items
            .iter()
            .map(|it| (it.name.as_os_str(), it))
            .collect();
        let fresh_by_name: HashMap<&OsStr, &DepItem> = fresh
            .items
            .iter()
            .map(|it| (it.name.as_os_str(), it))
            .collect();

        let mut removed: Vec<DepItem> = self
            .items
            .iter()
            .filter(|it| {
                fresh_by_name
                    .get(it.name.as_os_str())
                    .map_or(true, |f| f.inode != it.inode)
            })
            .cloned()
            .collect();
        let added: Vec<DepItem> = fresh
            .items
            .iter()
            .filter(|it| {
                old_by_name
                    .get(it.name.as_os_str())
                    .map_or(true, |o| o.inode != it.inode)
            })
            .cloned()
            .collect();

        // Pair removed and added entries that share an inode as moves.
        let mut added_by_inode: HashMap<u64, Vec<DepItem>> = HashMap::new();
        for it in added {
            added_by_inode.entry(it.inode).or_default().push(it);
        }

        let mut delta = DepDelta::default();
        removed.retain(|old| {
            if let Some(slot) = added_by_inode.get_mut(&old.inode) {
                if !slot.is_empty() {
                    let new = slot.remove(0);
                    delta.moved.push((old.clone(), new));
                    return false;
                }
            }
            true
        });
        delta.removed = removed;
        for (_, mut slot) in added_by_inode {
            delta.added.append(&mut slot);
        }
        delta.added.sort_by(|a, b| a.name.cmp(&b.name));
        delta.moved.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        delta
    }

    /// Replace this snapshot with a fresh one, carrying already-resolved
    /// entry types forward where the fresh listing could not determine them.
    pub fn adopt(&mut self, mut fresh: DepList) {
        let known: HashMap<u64, FileKind> = self
            .items
            .iter()
            .filter(|it| it.kind != FileKind::Unknown)
            .map(|it| (it.inode, it.kind))
            .collect();
        for it in &mut fresh.items {
            if it.kind == FileKind::Unknown {
                if let Some(kind) = known.get(&it.inode) {
                    it.kind = *kind;
                }
            }
        }
        self.items = fresh.items;
    }

    #[cfg(test)]
    pub(crate) fn from_items(mut items: Vec<DepItem>) -> Self {
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, inode: u64, kind: FileKind) -> DepItem {
        DepItem {
            name: name.into(),
            inode,
            kind,
        }
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let old = DepList::from_items(vec![item("a", 1, FileKind::File)]);
        let new = DepList::from_items(vec![item("b", 2, FileKind::File)]);
        let delta = old.diff(&new);
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.added.len(), 1);
        assert!(delta.moved.is_empty());
        assert_eq!(delta.removed[0].name, "a");
        assert_eq!(delta.added[0].name, "b");
    }

    #[test]
    fn diff_pairs_rename_as_move() {
        let old = DepList::from_items(vec![
            item("a", 1, FileKind::File),
            item("keep", 9, FileKind::Dir),
        ]);
        let new = DepList::from_items(vec![
            item("b", 1, FileKind::File),
            item("keep", 9, FileKind::Dir),
        ]);
        let delta = old.diff(&new);
        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        assert_eq!(delta.moved.len(), 1);
        assert_eq!(delta.moved[0].0.name, "a");
        assert_eq!(delta.moved[0].1.name, "b");
    }

    #[test]
    fn same_name_new_inode_is_remove_plus_add() {
        // Inode reuse under the same name must not look like a no-op.
        let old = DepList::from_items(vec![item("f", 1, FileKind::File)]);
        let new = DepList::from_items(vec![item("f", 2, FileKind::File)]);
        let delta = old.diff(&new);
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.added.len(), 1);
        assert!(delta.moved.is_empty());
        assert_eq!(delta.removed[0].inode, 1);
        assert_eq!(delta.added[0].inode, 2);
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let old = DepList::from_items(vec![
            item("a", 1, FileKind::File),
            item("b", 2, FileKind::Dir),
        ]);
        let delta = old.diff(&old.clone());
        assert!(delta.is_empty());
    }

    #[test]
    fn adopt_carries_resolved_kinds_forward() {
        let mut old = DepList::from_items(vec![item("a", 1, FileKind::Dir)]);
        let fresh = DepList::from_items(vec![
            item("renamed", 1, FileKind::Unknown),
            item("new", 2, FileKind::Unknown),
        ]);
        old.adopt(fresh);
        let renamed = old.get(old.position_by_name(OsStr::new("renamed")).unwrap()).unwrap();
        assert_eq!(renamed.kind, FileKind::Dir);
        let new = old.get(old.position_by_name(OsStr::new("new")).unwrap()).unwrap();
        assert_eq!(new.kind, FileKind::Unknown);
    }

    #[test]
    fn position_by_name_on_sorted_items() {
        let list = DepList::from_items(vec![
            item("c", 3, FileKind::File),
            item("a", 1, FileKind::File),
            item("b", 2, FileKind::File),
        ]);
        assert_eq!(list.position_by_name(OsStr::new("b")), Some(1));
        assert_eq!(list.position_by_name(OsStr::new("zz")), None);
    }

    #[test]
    fn listing_snapshots_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let fd = crate::sys::watch_open(
            None,
            dir.path().as_os_str(),
            crate::events::EventMask::empty(),
        )
        .unwrap();
        use std::os::fd::AsFd;
        let list = DepList::listing(fd.as_fd()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.position_by_name(OsStr::new("x")).is_some());
    }
}
