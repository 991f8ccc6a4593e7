//! Worker thread ownership of a session.
//!
//! All session state lives on one dedicated thread; callers talk to it
//! through a command channel and read delivered events from a bounded
//! event channel. The spawn rendezvouses on a barrier so the handle is
//! only returned once the thread is running and registered.

use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::backend::{VnodeBackend, WatchToken};
use crate::config::Config;
use crate::error::{Result, WatchError};
use crate::events::{Event, EventMask, WatchId};
use crate::filter::FilterFlags;
use crate::registry::{self, SessionId};
use crate::session::Session;

enum Command {
    AddWatch {
        path: PathBuf,
        mask: EventMask,
        reply: Sender<Result<WatchId>>,
    },
    UpdateWatch {
        wd: WatchId,
        flags: EventMask,
        reply: Sender<Result<()>>,
    },
    RemoveWatch {
        wd: WatchId,
        reply: Sender<Result<()>>,
    },
    Dispatch {
        token: WatchToken,
        fflags: FilterFlags,
    },
    Shutdown,
}

/// Handle to a session running on its own thread.
pub struct WorkerHandle {
    id: SessionId,
    commands: Sender<Command>,
    events: Receiver<Event>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker owning a fresh session over `backend`.
    pub fn spawn<B>(backend: B, config: Config) -> Result<Self>
    where
        B: VnodeBackend + Send + 'static,
    {
        let id = registry::register();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();
        let (ev_tx, ev_rx) = crossbeam_channel::bounded(config.event_capacity);
        let barrier = Arc::new(Barrier::new(2));
        let thread_barrier = Arc::clone(&barrier);

        let spawned = std::thread::Builder::new()
            .name(format!("kqnotify-worker-{}", id.raw()))
            .spawn(move || {
                let mut session = Session::new(backend, config, ev_tx);
                thread_barrier.wait();
                for cmd in cmd_rx {
                    match cmd {
                        Command::AddWatch { path, mask, reply } => {
                            let _ = reply.send(session.add_watch(&path, mask));
                        }
                        Command::UpdateWatch { wd, flags, reply } => {
                            let _ = reply.send(session.update_watch(wd, flags));
                        }
                        Command::RemoveWatch { wd, reply } => {
                            let _ = reply.send(session.remove_watch(wd));
                        }
                        Command::Dispatch { token, fflags } => {
                            session.dispatch(token, fflags);
                        }
                        Command::Shutdown => break,
                    }
                }
            });
        let thread = match spawned {
            Ok(t) => t,
            Err(err) => {
                registry::deregister(id);
                return Err(WatchError::Io(err));
            }
        };
        barrier.wait();

        Ok(Self {
            id,
            commands: cmd_tx,
            events: ev_rx,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Receiver for delivered events.
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    pub fn add_watch(&self, path: impl Into<PathBuf>, mask: EventMask) -> Result<WatchId> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::AddWatch {
                path: path.into(),
                mask,
                reply,
            })
            .map_err(|_| WatchError::SessionClosed)?;
        rx.recv().map_err(|_| WatchError::SessionClosed)?
    }

    pub fn update_watch(&self, wd: WatchId, flags: EventMask) -> Result<()> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::UpdateWatch { wd, flags, reply })
            .map_err(|_| WatchError::SessionClosed)?;
        rx.recv().map_err(|_| WatchError::SessionClosed)?
    }

    pub fn remove_watch(&self, wd: WatchId) -> Result<()> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::RemoveWatch { wd, reply })
            .map_err(|_| WatchError::SessionClosed)?;
        rx.recv().map_err(|_| WatchError::SessionClosed)?
    }

    /// Inject a raised vnode event for routing. Called by the queue poll
    /// loop that owns the backend's event source.
    pub fn dispatch(&self, token: WatchToken, fflags: FilterFlags) -> Result<()> {
        self.commands
            .send(Command::Dispatch { token, fflags })
            .map_err(|_| WatchError::SessionClosed)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("worker thread for session {} panicked", self.id.raw());
            }
        }
        registry::deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use std::ffi::OsStr;
    use std::time::Duration;

    #[test]
    fn worker_round_trip() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        // Keep a clone of the backend; its arm log is shared, so the test
        // can recover the token the poll loop would have handed us.
        let backend = RecordingBackend::new();
        let worker = WorkerHandle::spawn(backend.clone(), Config::default()).unwrap();

        let wd = worker
            .add_watch(dir.path(), EventMask::IN_CREATE | EventMask::IN_DELETE)
            .unwrap();
        std::fs::write(dir.path().join("f"), b"").unwrap();

        let ino = backend
            .records()
            .into_iter()
            .find(|r| r.token.wd == wd)
            .map(|r| r.token.ino)
            .unwrap();
        worker
            .dispatch(WatchToken { wd, ino }, FilterFlags::NOTE_WRITE)
            .unwrap();

        let ev = worker
            .events()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(ev.mask.contains(EventMask::IN_CREATE));
        assert_eq!(ev.name.as_deref(), Some(OsStr::new("f")));

        worker.remove_watch(wd).unwrap();
        let ev = worker
            .events()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(ev.mask, EventMask::IN_IGNORED);
    }

    #[test]
    fn drop_joins_thread_and_deregisters() {
        let worker = WorkerHandle::spawn(RecordingBackend::new(), Config::default()).unwrap();
        let id = worker.id();
        assert!(registry::is_active(id));
        drop(worker);
        assert!(!registry::is_active(id));
    }

    #[test]
    fn spawned_workers_get_distinct_ids() {
        let a = WorkerHandle::spawn(RecordingBackend::new(), Config::default()).unwrap();
        let b = WorkerHandle::spawn(RecordingBackend::new(), Config::default()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
