//! Kqueue-backed vnode event queue.
//!
//! Only built where `EVFILT_VNODE` carries the full set of note bits the
//! engine arms. The poll loop side hands raised events back to the worker
//! as `(token, fflags)` pairs; tokens are recovered from a descriptor map
//! kept alongside the queue, since a kevent identifies its source only by
//! raw descriptor.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{VnodeBackend, WatchToken};
use crate::filter::FilterFlags;

pub struct KqueueBackend {
    kq: OwnedFd,
    tokens: Mutex<HashMap<RawFd, WatchToken>>,
}

impl KqueueBackend {
    pub fn new() -> io::Result<Self> {
        let raw = unsafe { libc::kqueue() };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            kq: unsafe { OwnedFd::from_raw_fd(raw) },
            tokens: Mutex::new(HashMap::new()),
        })
    }

    /// Wait for raised vnode events, up to `timeout` when given.
    pub fn poll(&self, timeout: Option<Duration>) -> io::Result<Vec<(WatchToken, FilterFlags)>> {
        let ts = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let mut out: [libc::kevent; 32] = unsafe { std::mem::zeroed() };
        let n = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                std::ptr::null(),
                0,
                out.as_mut_ptr(),
                out.len() as libc::c_int,
                ts.as_ref()
                    .map_or(std::ptr::null(), |ts| ts as *const libc::timespec),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let tokens = self.tokens.lock();
        let mut raised = Vec::with_capacity(n as usize);
        for ev in &out[..n as usize] {
            let Some(token) = tokens.get(&(ev.ident as RawFd)) else {
                continue;
            };
            raised.push((*token, FilterFlags::from_bits_truncate(ev.fflags)));
        }
        Ok(raised)
    }
}

impl VnodeBackend for KqueueBackend {
    fn arm(&self, fd: BorrowedFd<'_>, token: WatchToken, fflags: FilterFlags) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        let mut tokens = self.tokens.lock();
        if fflags.is_empty() {
            // Clearing drops the registration but keeps the descriptor open.
            // The struct layout varies by release, so start from zeroes.
            let mut change: libc::kevent = unsafe { std::mem::zeroed() };
            change.ident = raw as usize;
            change.filter = libc::EVFILT_VNODE;
            change.flags = libc::EV_DELETE;
            let rc = unsafe {
                libc::kevent(
                    self.kq.as_raw_fd(),
                    &change,
                    1,
                    std::ptr::null_mut(),
                    0,
                    std::ptr::null(),
                )
            };
            tokens.remove(&raw);
            if rc < 0 {
                let err = io::Error::last_os_error();
                // Never registered is fine here.
                if err.raw_os_error() != Some(libc::ENOENT) {
                    return Err(err);
                }
            }
            return Ok(());
        }

        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = raw as usize;
        change.filter = libc::EVFILT_VNODE;
        change.flags = libc::EV_ADD | libc::EV_CLEAR;
        change.fflags = fflags.bits();
        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                &change,
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        tokens.insert(raw, token);
        Ok(())
    }
}
