//! Thin safe wrappers over the libc calls the watch engine needs.
//!
//! Everything here works on descriptors, not paths: once a watch is open,
//! its identity is the descriptor plus the `(dev, ino)` pair, and further
//! lookups resolve relative to it via the `*at` family. That keeps the
//! engine correct across renames of ancestor directories.

use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use crate::events::EventMask;
use crate::filter::FileKind;

/// Identity and type of a filesystem object, as read from `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub dev: u64,
    pub ino: u64,
    pub kind: FileKind,
}

impl FileInfo {
    fn from_stat(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            kind: FileKind::from_mode(st.st_mode as u32),
        }
    }
}

fn cstring(name: &OsStr) -> io::Result<CString> {
    CString::new(name.as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"))
}

/// Open a path for watching, honoring the open-time mask flags.
///
/// `IN_DONT_FOLLOW` maps to `O_NOFOLLOW` and `IN_ONLYDIR` to `O_DIRECTORY`,
/// so the kernel enforces both at open time. With `dirfd` the name resolves
/// relative to that directory, otherwise relative to the working directory.
pub fn watch_open(
    dirfd: Option<BorrowedFd<'_>>,
    name: &OsStr,
    mask: EventMask,
) -> io::Result<OwnedFd> {
    let mut flags = libc::O_RDONLY | libc::O_NONBLOCK | libc::O_CLOEXEC;
    if mask.contains(EventMask::IN_DONT_FOLLOW) {
        flags |= libc::O_NOFOLLOW;
    }
    if mask.contains(EventMask::IN_ONLYDIR) {
        flags |= libc::O_DIRECTORY;
    }
    let at = dirfd.map_or(libc::AT_FDCWD, |fd| fd.as_raw_fd());
    let cname = cstring(name)?;
    let raw = unsafe { libc::openat(at, cname.as_ptr(), flags) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

/// Stat an open descriptor.
pub fn stat_fd(fd: BorrowedFd<'_>) -> io::Result<FileInfo> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(fd.as_raw_fd(), &mut st) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(FileInfo::from_stat(&st))
}

/// Stat a directory entry without following a trailing symlink.
pub fn lstat_at(dirfd: BorrowedFd<'_>, name: &OsStr) -> io::Result<FileInfo> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let cname = cstring(name)?;
    let rc = unsafe {
        libc::fstatat(
            dirfd.as_raw_fd(),
            cname.as_ptr(),
            &mut st,
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(FileInfo::from_stat(&st))
}

/// One directory entry as returned by [`list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub inode: u64,
    pub kind: FileKind,
}

#[cfg(any(
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    target_os = "macos",
))]
fn dirent_ino(entry: &libc::dirent) -> u64 {
    entry.d_fileno as u64
}

#[cfg(not(any(
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    target_os = "macos",
)))]
fn dirent_ino(entry: &libc::dirent) -> u64 {
    entry.d_ino as u64
}

/// List the entries of an open directory, sorted by name.
///
/// The directory is reopened through its own descriptor so the stream owns
/// an independent position and the watch descriptor's offset is untouched.
/// `.` and `..` are skipped.
pub fn list_dir(dirfd: BorrowedFd<'_>) -> io::Result<Vec<DirEntry>> {
    let raw = unsafe {
        libc::openat(
            dirfd.as_raw_fd(),
            c".".as_ptr(),
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    let stream = unsafe { libc::fdopendir(raw) };
    if stream.is_null() {
        let err = io::Error::last_os_error();
        unsafe { libc::close(raw) };
        return Err(err);
    }

    let mut entries = Vec::new();
    loop {
        // A NULL return is treated as end of stream.
        let entry = unsafe { libc::readdir(stream) };
        if entry.is_null() {
            break;
        }
        let entry = unsafe { &*entry };
        let name_bytes = unsafe { std::ffi::CStr::from_ptr(entry.d_name.as_ptr()) }.to_bytes();
        if name_bytes == b"." || name_bytes == b".." {
            continue;
        }
        entries.push(DirEntry {
            name: OsString::from_vec(name_bytes.to_vec()),
            inode: dirent_ino(entry),
            kind: FileKind::from_dirent_type(entry.d_type),
        });
    }
    unsafe { libc::closedir(stream) };

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Name of the filesystem holding `fd`, when it can be determined.
///
/// Used to decide whether per-entry watches are worth opening at all; on
/// network and synthetic filesystems vnode notification is unreliable and
/// descriptors are expensive.
#[cfg(target_os = "linux")]
pub fn fs_type_name(fd: BorrowedFd<'_>) -> Option<String> {
    let mut st: libc::statfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstatfs(fd.as_raw_fd(), &mut st) };
    if rc < 0 {
        return None;
    }
    let name = match st.f_type as i64 {
        0x6969 => "nfs",
        0x517b => "smbfs",
        0xff53_4d42 => "cifs",
        0x6573_5546 => "fuseblk",
        0x9fa0 => "procfs",
        0x1373 => "devfs",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(any(
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    target_os = "macos",
))]
pub fn fs_type_name(fd: BorrowedFd<'_>) -> Option<String> {
    let mut st: libc::statfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstatfs(fd.as_raw_fd(), &mut st) };
    if rc < 0 {
        return None;
    }
    let bytes: Vec<u8> = st
        .f_fstypename
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8(bytes).ok()
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    target_os = "macos",
)))]
pub fn fs_type_name(_fd: BorrowedFd<'_>) -> Option<String> {
    None
}
