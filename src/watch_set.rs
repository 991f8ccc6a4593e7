//! Inode-keyed index of a user watch's low-level watches.

use std::collections::BTreeMap;

use crate::watch::{Dependent, Watch};

/// All low-level watches belonging to one user watch, keyed by inode.
///
/// The inode key is what makes hard links cheap: a second entry resolving
/// to an already-watched inode just gains a dependent on the existing
/// watch instead of opening another descriptor.
#[derive(Debug, Default)]
pub struct WatchSet {
    map: BTreeMap<u64, Watch>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, watch: Watch) {
        self.map.insert(watch.ino(), watch);
    }

    pub fn find(&self, ino: u64) -> Option<&Watch> {
        self.map.get(&ino)
    }

    pub fn find_mut(&mut self, ino: u64) -> Option<&mut Watch> {
        self.map.get_mut(&ino)
    }

    pub fn remove(&mut self, ino: u64) -> Option<Watch> {
        self.map.remove(&ino)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.map.values()
    }

    /// Drop `dep` from the watch on `ino`, evicting the watch when its
    /// dependent set drains. Eviction drops the watch, which closes the
    /// descriptor and unregisters it from the event queue in one step.
    ///
    /// Returns true when the watch was evicted.
    pub fn release_dep(&mut self, ino: u64, dep: &Dependent) -> bool {
        let Some(watch) = self.map.get_mut(&ino) else {
            return false;
        };
        watch.del_dep(dep);
        if watch.deps_empty() {
            self.map.remove(&ino);
            true
        } else {
            false
        }
    }
}
