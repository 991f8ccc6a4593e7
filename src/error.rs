use std::path::PathBuf;

use crate::events::WatchId;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a directory: {0}")]
    NotDirectory(PathBuf),

    #[error("watch not found: {0}")]
    WatchNotFound(WatchId),

    #[error("session closed")]
    SessionClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
