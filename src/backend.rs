//! Seam between the watch engine and the vnode event queue.
//!
//! The engine decides which descriptors to hold open and which filter bits
//! each should arm; the backend owns the actual event queue registration.
//! Keeping the queue behind a trait lets the whole engine run under test
//! against a recording fake.

use std::io;
use std::os::fd::BorrowedFd;

use crate::events::WatchId;
use crate::filter::FilterFlags;

/// Identifies a low-level watch in backend callbacks.
///
/// The user watch is named by `wd`, the specific descriptor by the inode it
/// was opened on. Together they route a raised event back to the right
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchToken {
    pub wd: WatchId,
    pub ino: u64,
}

/// Registers descriptors with a vnode-level event queue.
pub trait VnodeBackend {
    /// Arm `fd` for the given filter bits, tagging it with `token`.
    ///
    /// Called again on the same descriptor to re-arm with a different set.
    /// An empty set clears the registration but leaves the descriptor open;
    /// closing the descriptor unregisters it entirely, so the engine never
    /// needs an explicit delete call.
    fn arm(&self, fd: BorrowedFd<'_>, token: WatchToken, fflags: FilterFlags) -> io::Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::os::fd::AsRawFd;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ArmRecord {
        pub raw_fd: i32,
        pub token: WatchToken,
        pub fflags: FilterFlags,
    }

    /// Backend fake that records every arm call.
    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        log: Arc<parking_lot::Mutex<Vec<ArmRecord>>>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<ArmRecord> {
            self.log.lock().clone()
        }

        pub fn last_for_ino(&self, ino: u64) -> Option<ArmRecord> {
            self.log
                .lock()
                .iter()
                .rev()
                .find(|r| r.token.ino == ino)
                .cloned()
        }
    }

    impl VnodeBackend for RecordingBackend {
        fn arm(
            &self,
            fd: BorrowedFd<'_>,
            token: WatchToken,
            fflags: FilterFlags,
        ) -> io::Result<()> {
            self.log.lock().push(ArmRecord {
                raw_fd: fd.as_raw_fd(),
                token,
                fflags,
            });
            Ok(())
        }
    }
}
