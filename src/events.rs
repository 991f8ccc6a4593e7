//! User-facing event masks and event records.
//!
//! The mask layout follows the inotify model: callers request a set of event
//! kinds when adding a watch and receive structured records keyed by a watch
//! handle. Byte-level serialization of events for a reading client is out of
//! scope; these are the in-process records handed to the session's channel.

use std::ffi::OsString;
use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Requested / delivered event mask.
    ///
    /// These match the well-known inotify mask values so callers can carry
    /// masks over unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// File was read.
        const IN_ACCESS = 0x0000_0001;
        /// File content was modified.
        const IN_MODIFY = 0x0000_0002;
        /// Metadata changed (permissions, timestamps, link count).
        const IN_ATTRIB = 0x0000_0004;
        /// Writable file was closed.
        const IN_CLOSE_WRITE = 0x0000_0008;
        /// Unwritable file was closed.
        const IN_CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const IN_OPEN = 0x0000_0020;
        /// Entry moved out of the watched directory.
        const IN_MOVED_FROM = 0x0000_0040;
        /// Entry moved into the watched directory.
        const IN_MOVED_TO = 0x0000_0080;
        /// Entry created in the watched directory.
        const IN_CREATE = 0x0000_0100;
        /// Entry deleted from the watched directory.
        const IN_DELETE = 0x0000_0200;
        /// The watched object itself was deleted.
        const IN_DELETE_SELF = 0x0000_0400;
        /// The watched object itself was moved.
        const IN_MOVE_SELF = 0x0000_0800;

        /// Close event, writable or not.
        const IN_CLOSE = Self::IN_CLOSE_WRITE.bits() | Self::IN_CLOSE_NOWRITE.bits();
        /// Move event, either direction.
        const IN_MOVE = Self::IN_MOVED_FROM.bits() | Self::IN_MOVED_TO.bits();

        /// Every reportable event kind.
        const IN_ALL_EVENTS = Self::IN_ACCESS.bits()
            | Self::IN_MODIFY.bits()
            | Self::IN_ATTRIB.bits()
            | Self::IN_CLOSE_WRITE.bits()
            | Self::IN_CLOSE_NOWRITE.bits()
            | Self::IN_OPEN.bits()
            | Self::IN_MOVED_FROM.bits()
            | Self::IN_MOVED_TO.bits()
            | Self::IN_CREATE.bits()
            | Self::IN_DELETE.bits()
            | Self::IN_DELETE_SELF.bits()
            | Self::IN_MOVE_SELF.bits();

        /// Only watch the path if it is a directory.
        const IN_ONLYDIR = 0x0100_0000;
        /// Do not follow a trailing symlink.
        const IN_DONT_FOLLOW = 0x0200_0000;
        /// Merge with the existing mask instead of replacing it.
        const IN_MASK_ADD = 0x2000_0000;
        /// Remove the watch after delivering its first event.
        const IN_ONESHOT = 0x8000_0000;

        /// Watch was removed, explicitly or because its object went away.
        const IN_IGNORED = 0x0000_8000;
        /// The subject of the event is a directory.
        const IN_ISDIR = 0x4000_0000;
        /// The event queue overflowed and events were dropped.
        const IN_Q_OVERFLOW = 0x0000_4000;
        /// The filesystem holding the watched object was unmounted.
        const IN_UNMOUNT = 0x0000_2000;
    }
}

/// Handle identifying one user watch within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(i32);

impl WatchId {
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    /// The handle carried by queue-overflow events, which belong to no watch.
    pub const OVERFLOW: WatchId = WatchId(-1);
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// One delivered change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The user watch this event belongs to.
    pub wd: WatchId,
    /// What happened, plus `IN_ISDIR` when the subject is a directory.
    pub mask: EventMask,
    /// Pairs the two halves of a rename; zero otherwise.
    pub cookie: u32,
    /// Entry name relative to the watched directory, when the subject is a
    /// directory entry rather than the watched object itself.
    pub name: Option<OsString>,
}

impl Event {
    pub fn new(wd: WatchId, mask: EventMask) -> Self {
        Self {
            wd,
            mask,
            cookie: 0,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<OsString>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cookie(mut self, cookie: u32) -> Self {
        self.cookie = cookie;
        self
    }

    /// The sentinel event reporting that the queue overflowed.
    pub fn overflow() -> Self {
        Self::new(WatchId::OVERFLOW, EventMask::IN_Q_OVERFLOW)
    }
}
