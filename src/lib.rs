//! Recursive watch management in the inotify model, emulated over
//! vnode-level change notification.
//!
//! Callers watch paths and receive structured events; under the hood every
//! watched directory fans out into one descriptor per entry, shared across
//! hard links by inode, and directory-level writes are turned into
//! per-entry create, delete and move events by diffing listing snapshots.
//!
//! - [`Session`] owns the watches; it is single-threaded by design.
//! - [`WorkerHandle`] runs a session on its own thread behind channels.
//! - [`VnodeBackend`] is the seam to the platform event queue; a kqueue
//!   implementation is provided where the platform supports it.

pub mod backend;
pub mod config;
pub mod deps;
pub mod error;
pub mod events;
pub mod filter;
#[cfg(target_os = "freebsd")]
pub mod kqueue;
pub mod registry;
pub mod session;
pub mod sys;
pub mod user_watch;
pub mod watch;
pub mod watch_set;
pub mod worker;

pub use backend::{VnodeBackend, WatchToken};
pub use config::Config;
pub use error::{Result, WatchError};
pub use events::{Event, EventMask, WatchId};
pub use filter::{FileKind, FilterFlags};
#[cfg(target_os = "freebsd")]
pub use kqueue::KqueueBackend;
pub use session::Session;
pub use worker::WorkerHandle;
