//! Core error taxonomy shared by all file operations.
//!
//! Every operation surfaces one of these kinds to the dispatcher
//! unchanged; the dispatcher owns the translation into JSON-RPC error
//! codes. [`FsError::kind`] yields the machine-readable discriminant
//! string carried in the wire-level `error.data` field so clients can
//! tell failure classes apart without parsing messages.
//!
//! Paths embedded in errors are always root-relative: absolute host
//! paths never leave the process.

use std::io;

/// Errors produced by path resolution, file operations, and the lock
/// coordinator client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FsError {
    /// Malformed input: empty path, negative offset/length, oversized
    /// read, bad enum value, identical source and target.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input.
        reason: String,
    },

    /// The resolved path lies outside the configured root.
    #[error("path escapes the root directory: {path}")]
    PathEscape {
        /// The offending caller-supplied path.
        path: String,
    },

    /// The target entry (or a required parent) does not exist.
    #[error("no such entry: {path}")]
    NotFound {
        /// Root-relative path that was missing.
        path: String,
    },

    /// An entry already exists where the operation requires absence.
    #[error("entry already exists: {path}")]
    AlreadyExists {
        /// Root-relative path of the conflicting entry.
        path: String,
    },

    /// The entry is not a directory but the operation requires one.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// Root-relative path of the entry.
        path: String,
    },

    /// The entry is a directory but the operation requires a file.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// Root-relative path of the entry.
        path: String,
    },

    /// The entry exists but is not a regular file.
    #[error("not a regular file: {path}")]
    NotAFile {
        /// Root-relative path of the entry.
        path: String,
    },

    /// Non-recursive delete on a directory that still has children.
    #[error("directory is not empty: {path}")]
    DirectoryNotEmpty {
        /// Root-relative path of the directory.
        path: String,
    },

    /// The host filesystem denied permission.
    #[error("access denied: {path}")]
    AccessDenied {
        /// Root-relative path of the entry.
        path: String,
    },

    /// Any other filesystem failure.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Operation and root-relative path that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The coordinator could not grant the lease within the retry
    /// budget.
    #[error("could not acquire lock {key}: {reason}")]
    LockUnavailable {
        /// The lease key that could not be acquired.
        key: String,
        /// Why acquisition failed (exhausted retries, cancellation).
        reason: String,
    },
}

impl FsError {
    /// Machine-readable kind string for the wire-level `error.data`
    /// field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::PathEscape { .. } => "PathEscape",
            Self::NotFound { .. } => "NotFound",
            Self::AlreadyExists { .. } => "AlreadyExists",
            Self::NotADirectory { .. } => "NotADirectory",
            Self::IsADirectory { .. } => "IsADirectory",
            Self::NotAFile { .. } => "NotAFile",
            Self::DirectoryNotEmpty { .. } => "DirectoryNotEmpty",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::Io { .. } => "IOError",
            Self::LockUnavailable { .. } => "LockUnavailable",
        }
    }

    /// Whether this error should map to the protocol's invalid-params
    /// code rather than the internal-error code.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::PathEscape { .. }
        )
    }

    /// Convenience constructor for [`FsError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Maps an [`io::Error`] onto the taxonomy, attributing it to the
    /// given root-relative path.
    ///
    /// Well-known kinds (`NotFound`, `PermissionDenied`,
    /// `AlreadyExists`) and errnos (`ENOTEMPTY`, `ENOTDIR`, `EISDIR`)
    /// become their dedicated variants; everything else is wrapped as
    /// [`FsError::Io`] with the operation name as context.
    pub(crate) fn from_io(path: &str, context: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path: path.into() },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { path: path.into() },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path: path.into() },
            _ => match source.raw_os_error() {
                Some(libc::ENOTEMPTY) => Self::DirectoryNotEmpty { path: path.into() },
                Some(libc::ENOTDIR) => Self::NotADirectory { path: path.into() },
                Some(libc::EISDIR) => Self::IsADirectory { path: path.into() },
                _ => Self::Io {
                    context: format!("{context} {path}"),
                    source,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_dedicated_variants() {
        let err = FsError::from_io(
            "a/b.txt",
            "stat",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, FsError::NotFound { .. }));
        assert_eq!(err.kind(), "NotFound");

        let err = FsError::from_io(
            "a",
            "list",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, FsError::AccessDenied { .. }));

        let err = FsError::from_io(
            "a",
            "create",
            io::Error::new(io::ErrorKind::AlreadyExists, "busy"),
        );
        assert!(matches!(err, FsError::AlreadyExists { .. }));
    }

    #[test]
    fn errno_mappings() {
        let err = FsError::from_io("d", "delete", io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert!(matches!(err, FsError::DirectoryNotEmpty { .. }));

        let err = FsError::from_io("d", "create", io::Error::from_raw_os_error(libc::ENOTDIR));
        assert!(matches!(err, FsError::NotADirectory { .. }));
    }

    #[test]
    fn unknown_io_errors_keep_context() {
        let err = FsError::from_io(
            "x.txt",
            "read",
            io::Error::new(io::ErrorKind::Other, "disk on fire"),
        );
        match err {
            FsError::Io { context, .. } => assert_eq!(context, "read x.txt"),
            other => panic!("expected Io, got {other}"),
        }
    }

    #[test]
    fn invalid_input_split_matches_protocol_table() {
        assert!(FsError::invalid_argument("x").is_invalid_input());
        assert!(FsError::PathEscape { path: "..".into() }.is_invalid_input());
        assert!(!FsError::NotFound { path: "a".into() }.is_invalid_input());
        assert!(
            !FsError::LockUnavailable {
                key: "file:a".into(),
                reason: "retries exhausted".into()
            }
            .is_invalid_input()
        );
    }
}
