//! Error types for shqueue operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while creating, opening, or tearing down a queue.
///
/// Ring-protocol operations (`alloc`, `commit`, `peek`, `pop`, `push`) never
/// return this type — they express fullness/emptiness via `None`/`false`
/// sentinel values instead. This enum only surfaces from the mapping engine
/// and the named-shared/private lifecycles, and from `Builder::get()` on
/// first realization.
#[derive(Debug, Error)]
pub enum Error {
    /// `create_shared` found an existing backing object under the same name
    /// and could not remove it before creating a fresh one.
    #[error("name {name:?} is already in use and could not be reclaimed: {source}")]
    NameConflict { name: String, source: io::Error },

    /// `open_shared` found no backing object under this name.
    #[error("no shared queue named {name:?}")]
    NotFound { name: String },

    /// A namespace operation (create/open/unlink) was denied by the OS.
    #[error("permission denied accessing {name:?}: {source}")]
    PermissionDenied { name: String, source: io::Error },

    /// An opener observed the backing object before its creator published
    /// capacity. Retryable: the caller should poll with backoff.
    #[error("{name:?} has not finished initializing yet")]
    NotYetInitialized { name: String },

    /// A `mmap`/`munmap` call failed.
    #[error("{op} failed: {source}")]
    MappingFailed { op: &'static str, source: io::Error },

    /// Resizing the backing object (`ftruncate`) failed.
    #[error("resizing backing object failed: {source}")]
    ResizeFailed { source: io::Error },

    /// Closing the backing file descriptor failed.
    #[error("closing backing object failed: {source}")]
    CloseFailed { source: io::Error },

    /// `Builder::get`/`Builder::into_queue` was called again after a prior
    /// call already failed. The builder's intent (including any metadata
    /// initializer) was consumed by that attempt and cannot be replayed.
    #[error("this builder already failed to realize a queue and cannot be retried")]
    AlreadyAttempted,
}

impl Error {
    /// Returns `true` if retrying the same operation later might succeed.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotYetInitialized { .. })
    }

    /// Returns the name of the backing object this error is about, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::NameConflict { name, .. }
            | Self::NotFound { name }
            | Self::PermissionDenied { name, .. }
            | Self::NotYetInitialized { name } => Some(name.as_str()),
            Self::MappingFailed { .. }
            | Self::ResizeFailed { .. }
            | Self::CloseFailed { .. }
            | Self::AlreadyAttempted => None,
        }
    }

    pub(crate) fn from_os_error(name: &str, op: &'static str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { name: name.to_owned() },
            io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied { name: name.to_owned(), source }
            }
            io::ErrorKind::AlreadyExists => {
                Self::NameConflict { name: name.to_owned(), source }
            }
            _ => Self::MappingFailed { op, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_yet_initialized_is_retryable() {
        let err = Error::NotYetInitialized { name: "/q".into() };
        assert!(err.is_retryable());
        assert_eq!(err.name(), Some("/q"));
    }

    #[test]
    fn mapping_failed_is_not_retryable() {
        let err = Error::MappingFailed {
            op: "mmap",
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.name(), None);
    }

    #[test]
    fn from_os_error_maps_not_found() {
        let source = io::Error::from(io::ErrorKind::NotFound);
        let err = Error::from_os_error("/q", "shm_open", source);
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
