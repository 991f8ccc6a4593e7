//! A session: the set of user watches owned by one consumer.
//!
//! The session is single-threaded by construction; the worker thread owns
//! it and feeds it commands and raised vnode events, so no field needs a
//! lock. Delivered events go out over a bounded channel; when the channel
//! fills, events are dropped and a single overflow marker is delivered as
//! soon as space frees up.

use std::os::fd::AsFd;
use std::path::Path;

use crossbeam_channel::Sender;
use fnv::FnvHashMap;

use crate::backend::{VnodeBackend, WatchToken};
use crate::config::Config;
use crate::error::{Result, WatchError};
use crate::events::{Event, EventMask, WatchId};
use crate::filter::{self, FilterFlags};
use crate::sys;
use crate::user_watch::UserWatch;
use crate::watch::Dependent;

pub struct Session<B: VnodeBackend> {
    backend: B,
    config: Config,
    next_wd: i32,
    next_cookie: u32,
    watches: FnvHashMap<WatchId, UserWatch>,
    events: Sender<Event>,
    overflowed: bool,
}

impl<B: VnodeBackend> Session<B> {
    pub fn new(backend: B, config: Config, events: Sender<Event>) -> Self {
        Self {
            backend,
            config,
            next_wd: 0,
            next_cookie: 0,
            watches: FnvHashMap::default(),
            events,
            overflowed: false,
        }
    }

    /// Start watching a path, or widen an existing watch when the path
    /// resolves to an already-watched object.
    pub fn add_watch(&mut self, path: &Path, mask: EventMask) -> Result<WatchId> {
        if (mask & EventMask::IN_ALL_EVENTS).is_empty() {
            return Err(WatchError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "mask selects no events",
            )));
        }
        let fd = UserWatch::open(path, mask)?;
        let info = sys::stat_fd(fd.as_fd())?;

        // The same object watched through another path keeps its handle;
        // the new mask is applied to the existing watch.
        let existing = self
            .watches
            .values()
            .find(|uw| uw.dev() == info.dev && uw.ino() == info.ino)
            .map(|uw| uw.wd());
        if let Some(wd) = existing {
            drop(fd);
            if let Some(uw) = self.watches.get_mut(&wd) {
                uw.update_flags(&self.backend, mask)?;
            }
            return Ok(wd);
        }

        self.next_wd += 1;
        let wd = WatchId::new(self.next_wd);
        let uw = UserWatch::init(&self.backend, wd, fd, mask, &self.config)?;
        self.watches.insert(wd, uw);
        Ok(wd)
    }

    /// Replace or merge the mask of an existing watch.
    pub fn update_watch(&mut self, wd: WatchId, flags: EventMask) -> Result<()> {
        let uw = self
            .watches
            .get_mut(&wd)
            .ok_or(WatchError::WatchNotFound(wd))?;
        uw.update_flags(&self.backend, flags)
    }

    /// Stop watching. Delivers `IN_IGNORED`; removing an unknown handle is
    /// not an error, the watch may have torn itself down already.
    pub fn remove_watch(&mut self, wd: WatchId) -> Result<()> {
        self.forget(wd);
        Ok(())
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Route one raised vnode event to the user watch it belongs to.
    pub fn dispatch(&mut self, token: WatchToken, fflags: FilterFlags) {
        let Some(uw) = self.watches.get_mut(&token.wd) else {
            // Stale event raced with a removal.
            log::debug!("dropping event for unknown watch {}", token.wd);
            return;
        };

        let mut delivered = false;
        let mut teardown = false;

        if token.ino == uw.ino() {
            let kind = uw.root_kind();
            let mask = uw.mask();

            let self_mask = filter::self_event_mask(fflags, kind) & mask;
            if !self_mask.is_empty() {
                let mut ev_mask = self_mask;
                if kind.is_dir() {
                    ev_mask |= EventMask::IN_ISDIR;
                }
                Self::deliver(
                    &self.events,
                    &mut self.overflowed,
                    Event::new(token.wd, ev_mask),
                );
                delivered = true;
            }

            // The watched object was unmounted out from under us.
            if fflags.contains(FilterFlags::NOTE_REVOKE) {
                Self::deliver(
                    &self.events,
                    &mut self.overflowed,
                    Event::new(token.wd, EventMask::IN_UNMOUNT),
                );
            }

            if kind.is_dir()
                && fflags.intersects(
                    FilterFlags::NOTE_WRITE | FilterFlags::NOTE_EXTEND | FilterFlags::NOTE_LINK,
                )
            {
                match uw.rescan(&self.backend) {
                    Ok(delta) => {
                        for item in &delta.removed {
                            if mask.contains(EventMask::IN_DELETE) {
                                let mut m = EventMask::IN_DELETE;
                                if item.kind.is_dir() {
                                    m |= EventMask::IN_ISDIR;
                                }
                                Self::deliver(
                                    &self.events,
                                    &mut self.overflowed,
                                    Event::new(token.wd, m).with_name(item.name.clone()),
                                );
                                delivered = true;
                            }
                        }
                        for (from, to) in &delta.moved {
                            self.next_cookie = self.next_cookie.wrapping_add(1);
                            if self.next_cookie == 0 {
                                self.next_cookie = 1;
                            }
                            let cookie = self.next_cookie;
                            let isdir = if to.kind.is_dir() {
                                EventMask::IN_ISDIR
                            } else {
                                EventMask::empty()
                            };
                            if mask.contains(EventMask::IN_MOVED_FROM) {
                                Self::deliver(
                                    &self.events,
                                    &mut self.overflowed,
                                    Event::new(token.wd, EventMask::IN_MOVED_FROM | isdir)
                                        .with_name(from.name.clone())
                                        .with_cookie(cookie),
                                );
                                delivered = true;
                            }
                            if mask.contains(EventMask::IN_MOVED_TO) {
                                Self::deliver(
                                    &self.events,
                                    &mut self.overflowed,
                                    Event::new(token.wd, EventMask::IN_MOVED_TO | isdir)
                                        .with_name(to.name.clone())
                                        .with_cookie(cookie),
                                );
                                delivered = true;
                            }
                        }
                        for item in &delta.added {
                            if mask.contains(EventMask::IN_CREATE) {
                                let mut m = EventMask::IN_CREATE;
                                if item.kind.is_dir() {
                                    m |= EventMask::IN_ISDIR;
                                }
                                Self::deliver(
                                    &self.events,
                                    &mut self.overflowed,
                                    Event::new(token.wd, m).with_name(item.name.clone()),
                                );
                                delivered = true;
                            }
                        }
                    }
                    Err(err) => {
                        log::warn!("rescan failed for {}: {}", token.wd, err);
                    }
                }
            }

            if fflags.intersects(FilterFlags::NOTE_DELETE | FilterFlags::NOTE_REVOKE) {
                teardown = true;
            }
        } else {
            // A directory entry raised the event; report it once per name
            // that resolves to the inode.
            let Some(watch) = uw.watch(token.ino) else {
                log::debug!("dropping event for unknown inode under {}", token.wd);
                return;
            };
            let kind = watch.file_kind();
            let ev_mask = filter::dependent_event_mask(fflags, kind) & uw.mask();
            if !ev_mask.is_empty() {
                let mut full = ev_mask;
                if kind.is_dir() {
                    full |= EventMask::IN_ISDIR;
                }
                let names: Vec<_> = watch
                    .deps()
                    .filter_map(|dep| match dep {
                        Dependent::Entry(name) => Some(name.clone()),
                        Dependent::Sentinel => None,
                    })
                    .collect();
                for name in names {
                    Self::deliver(
                        &self.events,
                        &mut self.overflowed,
                        Event::new(token.wd, full).with_name(name),
                    );
                    delivered = true;
                }
            }
        }

        let oneshot = self.watches.get(&token.wd).map(|uw| uw.mask());
        if teardown || (delivered && oneshot.is_some_and(|m| m.contains(EventMask::IN_ONESHOT))) {
            self.forget(token.wd);
        }
    }

    /// Drop a user watch, closing its descriptors and delivering
    /// `IN_IGNORED`. A no-op for an unknown handle.
    fn forget(&mut self, wd: WatchId) {
        if let Some(mut uw) = self.watches.remove(&wd) {
            uw.close();
            Self::deliver(
                &self.events,
                &mut self.overflowed,
                Event::new(wd, EventMask::IN_IGNORED),
            );
        }
    }

    /// Push an event to the consumer, dropping it when the queue is full.
    ///
    /// The first drop flips the overflow flag; from then on events keep
    /// being dropped until the overflow marker itself makes it into the
    /// queue, so the consumer always learns that a gap exists.
    fn deliver(events: &Sender<Event>, overflowed: &mut bool, ev: Event) {
        if *overflowed {
            if events.try_send(Event::overflow()).is_err() {
                return;
            }
            *overflowed = false;
        }
        if events.try_send(ev).is_err() {
            *overflowed = true;
            log::warn!("event queue full, dropping events");
        }
    }
}
