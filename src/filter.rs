//! Translation between user event masks and vnode filter flags.
//!
//! A vnode watch reports a flat set of `NOTE_*` bits per descriptor. Which
//! bits a descriptor arms depends on three axes:
//!
//! - what the user asked for (the [`EventMask`])
//! - what the watched object is (file, directory, symlink)
//! - whether the descriptor is the root of a user watch or one of its
//!   directory entries
//!
//! The reverse direction maps received bits back to user events, again
//! split by role: self-referential events only make sense on the root.

use bitflags::bitflags;

use crate::events::EventMask;

bitflags! {
    /// Vnode-level filter bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilterFlags: u32 {
        const NOTE_DELETE = 0x0001;
        const NOTE_WRITE = 0x0002;
        const NOTE_EXTEND = 0x0004;
        const NOTE_ATTRIB = 0x0008;
        const NOTE_LINK = 0x0010;
        const NOTE_RENAME = 0x0020;
        const NOTE_REVOKE = 0x0040;
        const NOTE_OPEN = 0x0080;
        const NOTE_CLOSE = 0x0100;
        const NOTE_CLOSE_WRITE = 0x0200;
        const NOTE_READ = 0x0400;
    }
}

/// Coarse type of a watched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    /// Type not yet learned; treated as a file until resolved.
    Unknown,
}

impl FileKind {
    /// Classify from a `st_mode`.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileKind::Dir,
            m if m == libc::S_IFLNK as u32 => FileKind::Symlink,
            _ => FileKind::File,
        }
    }

    /// Classify from a directory entry's `d_type`, which may be `DT_UNKNOWN`
    /// on some filesystems.
    pub fn from_dirent_type(d_type: u8) -> Self {
        match d_type {
            libc::DT_DIR => FileKind::Dir,
            libc::DT_LNK => FileKind::Symlink,
            libc::DT_UNKNOWN => FileKind::Unknown,
            _ => FileKind::File,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, FileKind::Dir)
    }
}

/// The events a directory root must arm to observe its child list.
const CHILD_LIST_EVENTS: EventMask = EventMask::IN_CREATE
    .union(EventMask::IN_DELETE)
    .union(EventMask::IN_MOVED_FROM)
    .union(EventMask::IN_MOVED_TO);

/// Compute the filter bits a descriptor needs for `mask`.
///
/// Self-referential events (`IN_DELETE_SELF`, `IN_MOVE_SELF`) only translate
/// on the root descriptor; a directory entry going away is reported by its
/// parent's listing diff instead. Directory entries that are themselves
/// directories never arm `NOTE_WRITE`: changes inside a subdirectory are not
/// reported by a non-recursive watch.
pub fn needed_fflags(mask: EventMask, kind: FileKind, is_subwatch: bool) -> FilterFlags {
    let mut out = FilterFlags::empty();

    // Symlink descriptors only observe their own metadata and identity.
    if matches!(kind, FileKind::Symlink) {
        if !is_subwatch {
            if mask.contains(EventMask::IN_DELETE_SELF) {
                out |= FilterFlags::NOTE_DELETE | FilterFlags::NOTE_REVOKE;
            }
            if mask.contains(EventMask::IN_MOVE_SELF) {
                out |= FilterFlags::NOTE_RENAME;
            }
        }
        if mask.contains(EventMask::IN_ATTRIB) {
            out |= FilterFlags::NOTE_ATTRIB;
        }
        return out;
    }

    let is_dir = kind.is_dir();

    if !is_subwatch {
        if mask.contains(EventMask::IN_DELETE_SELF) {
            out |= FilterFlags::NOTE_DELETE | FilterFlags::NOTE_REVOKE;
        }
        if mask.contains(EventMask::IN_MOVE_SELF) {
            out |= FilterFlags::NOTE_RENAME;
        }
        // A directory root watches its own listing for entry churn.
        if is_dir && mask.intersects(CHILD_LIST_EVENTS) {
            out |= FilterFlags::NOTE_WRITE | FilterFlags::NOTE_EXTEND | FilterFlags::NOTE_LINK;
        }
    }

    if mask.contains(EventMask::IN_ATTRIB) {
        out |= FilterFlags::NOTE_ATTRIB;
        if !is_dir {
            // Hard-link count changes surface as NOTE_LINK on files.
            out |= FilterFlags::NOTE_LINK;
        }
    }
    if mask.contains(EventMask::IN_MODIFY) && !is_dir {
        out |= FilterFlags::NOTE_WRITE | FilterFlags::NOTE_EXTEND;
    }
    if mask.contains(EventMask::IN_ACCESS) {
        out |= FilterFlags::NOTE_READ;
    }
    if mask.contains(EventMask::IN_OPEN) {
        out |= FilterFlags::NOTE_OPEN;
    }
    if mask.contains(EventMask::IN_CLOSE_NOWRITE) {
        out |= FilterFlags::NOTE_CLOSE;
    }
    if mask.contains(EventMask::IN_CLOSE_WRITE) {
        out |= FilterFlags::NOTE_CLOSE_WRITE;
    }

    out
}

/// Compute the filter bits to arm, optionally keeping already-armed bits.
///
/// Merging is used by flag updates that add capability: the new bits are
/// unioned with the current set so existing coverage is never lost.
pub fn translate(
    mask: EventMask,
    kind: FileKind,
    is_subwatch: bool,
    armed: FilterFlags,
    merge: bool,
) -> FilterFlags {
    let bits = needed_fflags(mask, kind, is_subwatch);
    if merge {
        bits | armed
    } else {
        bits
    }
}

/// Map received bits on a root descriptor to the self events they imply.
///
/// The caller still intersects the result with the user's mask; this reports
/// everything the bits could mean.
pub fn self_event_mask(fflags: FilterFlags, kind: FileKind) -> EventMask {
    let mut out = EventMask::empty();
    if fflags.contains(FilterFlags::NOTE_DELETE) {
        out |= EventMask::IN_DELETE_SELF;
    }
    if fflags.contains(FilterFlags::NOTE_RENAME) {
        out |= EventMask::IN_MOVE_SELF;
    }
    if fflags.contains(FilterFlags::NOTE_ATTRIB) {
        out |= EventMask::IN_ATTRIB;
    }
    if fflags.contains(FilterFlags::NOTE_LINK) && !kind.is_dir() {
        out |= EventMask::IN_ATTRIB;
    }
    if !kind.is_dir() && fflags.intersects(FilterFlags::NOTE_WRITE | FilterFlags::NOTE_EXTEND) {
        out |= EventMask::IN_MODIFY;
    }
    if fflags.contains(FilterFlags::NOTE_READ) {
        out |= EventMask::IN_ACCESS;
    }
    if fflags.contains(FilterFlags::NOTE_OPEN) {
        out |= EventMask::IN_OPEN;
    }
    if fflags.contains(FilterFlags::NOTE_CLOSE) {
        out |= EventMask::IN_CLOSE_NOWRITE;
    }
    if fflags.contains(FilterFlags::NOTE_CLOSE_WRITE) {
        out |= EventMask::IN_CLOSE_WRITE;
    }
    out
}

/// Map received bits on a directory-entry descriptor to the events they
/// imply, named after the entry.
pub fn dependent_event_mask(fflags: FilterFlags, kind: FileKind) -> EventMask {
    let mut out = EventMask::empty();
    if fflags.contains(FilterFlags::NOTE_ATTRIB) {
        out |= EventMask::IN_ATTRIB;
    }
    if fflags.contains(FilterFlags::NOTE_LINK) && !kind.is_dir() {
        out |= EventMask::IN_ATTRIB;
    }
    if !kind.is_dir() && fflags.intersects(FilterFlags::NOTE_WRITE | FilterFlags::NOTE_EXTEND) {
        out |= EventMask::IN_MODIFY;
    }
    if fflags.contains(FilterFlags::NOTE_READ) {
        out |= EventMask::IN_ACCESS;
    }
    if fflags.contains(FilterFlags::NOTE_OPEN) {
        out |= EventMask::IN_OPEN;
    }
    if fflags.contains(FilterFlags::NOTE_CLOSE) {
        out |= EventMask::IN_CLOSE_NOWRITE;
    }
    if fflags.contains(FilterFlags::NOTE_CLOSE_WRITE) {
        out |= EventMask::IN_CLOSE_WRITE;
    }
    out
}
