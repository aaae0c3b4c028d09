//! The typed file-operation primitives exposed over the RPC surface.
//!
//! Every operation resolves its caller paths through [`RootDir`] before
//! touching the filesystem, then leans on the host's own guarantees
//! (create-exclusive, atomic rename) for correctness under concurrent
//! requests. `append` is the one exception: it serializes fleet-wide
//! through the lock coordinator, because plain O_APPEND gives no
//! cross-instance interleaving guarantee for multi-write payloads.
//!
//! # Concurrency
//!
//! Operations other than `append` run without coordination and may race
//! at the filesystem level; a `delete` concurrent with an `append` on
//! the same path has an unspecified outcome. Clients serialize such
//! mixed workloads externally.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::entry::EntryInfo;
use crate::error::FsError;
use crate::lock::{Lease, LockClient};
use crate::path::RootDir;

/// Per-call read cap: 1 MiB.
pub const MAX_READ: u64 = 1024 * 1024;

/// The file-operation service core.
///
/// Cheap to clone; holds only the root handle and the lock client.
#[derive(Debug, Clone)]
pub struct FileOps {
    root: RootDir,
    locks: LockClient,
}

impl FileOps {
    /// Builds the operation set over a root directory and a lock
    /// client.
    #[must_use]
    pub const fn new(root: RootDir, locks: LockClient) -> Self {
        Self { root, locks }
    }

    /// The root directory handle.
    #[must_use]
    pub const fn root(&self) -> &RootDir {
        &self.root
    }

    /// Returns the descriptor for a file or directory.
    ///
    /// Follows symlinks; directories report the host's size, not a
    /// tree walk.
    ///
    /// # Errors
    ///
    /// [`FsError::NotFound`] when the entry does not exist, plus the
    /// usual path-resolution failures.
    pub fn stat(&self, path: &str) -> Result<EntryInfo, FsError> {
        let abs = self.root.resolve(path)?;
        self.describe(&abs)
    }

    /// Lists the entries of a directory.
    ///
    /// Order is whatever the filesystem enumerates; entries that vanish
    /// between enumeration and stat are skipped rather than failing the
    /// aggregate.
    ///
    /// # Errors
    ///
    /// [`FsError::NotFound`], [`FsError::NotADirectory`], or
    /// [`FsError::AccessDenied`] for the directory itself.
    pub fn list(&self, path: &str) -> Result<Vec<EntryInfo>, FsError> {
        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);

        let meta = fs::metadata(&abs).map_err(|e| FsError::from_io(&rel, "list", e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory { path: rel });
        }

        let reader = fs::read_dir(&abs).map_err(|e| FsError::from_io(&rel, "list", e))?;
        let mut entries = Vec::new();
        for dirent in reader {
            let dirent = match dirent {
                Ok(d) => d,
                Err(error) => {
                    debug!(dir = %rel, %error, "skipping unreadable directory entry");
                    continue;
                },
            };
            match self.describe(&dirent.path()) {
                Ok(info) => entries.push(info),
                Err(error) => {
                    // The child may have disappeared since enumeration.
                    debug!(dir = %rel, %error, "skipping entry that failed to stat");
                },
            }
        }
        trace!(dir = %rel, count = entries.len(), "listed directory");
        Ok(entries)
    }

    /// Creates an empty regular file.
    ///
    /// The parent directory must already exist; nothing is created
    /// recursively.
    ///
    /// # Errors
    ///
    /// [`FsError::AlreadyExists`] when anything is already at the
    /// path, [`FsError::NotFound`] when the parent is missing,
    /// [`FsError::AccessDenied`] on permission failures.
    pub fn create_file(&self, path: &str) -> Result<(), FsError> {
        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);
        self.require_parent(&abs)?;

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
            .map_err(|e| FsError::from_io(&rel, "create file", e))?;
        trace!(path = %rel, "file created");
        Ok(())
    }

    /// Creates a single directory (not the chain).
    ///
    /// Same parent-existence and conflict semantics as
    /// [`FileOps::create_file`].
    ///
    /// # Errors
    ///
    /// See [`FileOps::create_file`].
    pub fn create_dir(&self, path: &str) -> Result<(), FsError> {
        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);
        self.require_parent(&abs)?;

        fs::create_dir(&abs).map_err(|e| FsError::from_io(&rel, "create directory", e))?;
        trace!(path = %rel, "directory created");
        Ok(())
    }

    /// Removes a file, symlink, or directory.
    ///
    /// Returns `false` (not an error) when the path does not exist.
    /// Symlinks are removed themselves, never their targets. A
    /// recursive directory delete walks depth-first and surfaces the
    /// first I/O error.
    ///
    /// # Errors
    ///
    /// [`FsError::DirectoryNotEmpty`] for a non-recursive delete of a
    /// directory with children; I/O failures otherwise.
    pub fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError> {
        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);

        // lstat so a symlink is deleted as the link itself.
        let meta = match fs::symlink_metadata(&abs) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %rel, "delete of absent path");
                return Ok(false);
            },
            Err(e) => return Err(FsError::from_io(&rel, "delete", e)),
        };

        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&abs).map_err(|e| FsError::from_io(&rel, "delete", e))?;
            } else {
                let mut children =
                    fs::read_dir(&abs).map_err(|e| FsError::from_io(&rel, "delete", e))?;
                if children.next().is_some() {
                    return Err(FsError::DirectoryNotEmpty { path: rel });
                }
                fs::remove_dir(&abs).map_err(|e| FsError::from_io(&rel, "delete", e))?;
            }
        } else {
            fs::remove_file(&abs).map_err(|e| FsError::from_io(&rel, "delete", e))?;
        }
        trace!(path = %rel, recursive, "deleted");
        Ok(true)
    }

    /// Moves a file or directory to a new location.
    ///
    /// Prefers the host's atomic rename; when the rename crosses
    /// filesystems the move degrades to copy-then-delete, which is
    /// logged.
    ///
    /// # Errors
    ///
    /// [`FsError::NotFound`] (source or target parent absent),
    /// [`FsError::AlreadyExists`] (target present),
    /// [`FsError::InvalidArgument`] (identical paths, or target beneath
    /// source), [`FsError::Io`] otherwise.
    pub fn rename(&self, source: &str, target: &str) -> Result<(), FsError> {
        let (src, dst, src_rel, dst_rel) = self.resolve_pair(source, target)?;

        // lstat: a symlink moves as the link itself.
        fs::symlink_metadata(&src).map_err(|e| FsError::from_io(&src_rel, "move", e))?;

        if fs::symlink_metadata(&dst).is_ok() {
            return Err(FsError::AlreadyExists { path: dst_rel });
        }
        self.require_parent(&dst)?;

        if dst.starts_with(&src) {
            return Err(FsError::invalid_argument(
                "target cannot lie beneath the source",
            ));
        }

        match fs::rename(&src, &dst) {
            Ok(()) => {
                trace!(source = %src_rel, target = %dst_rel, "moved");
                Ok(())
            },
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                warn!(
                    source = %src_rel,
                    target = %dst_rel,
                    "atomic rename crosses filesystems, falling back to copy and delete"
                );
                copy_tree(&src, &dst).map_err(|e| FsError::from_io(&dst_rel, "move", e))?;
                remove_tree(&src).map_err(|e| FsError::from_io(&src_rel, "move", e))?;
                Ok(())
            },
            Err(e) => Err(FsError::from_io(&src_rel, "move", e)),
        }
    }

    /// Copies a regular file byte-for-byte.
    ///
    /// Metadata preservation is not guaranteed.
    ///
    /// # Errors
    ///
    /// [`FsError::IsADirectory`] when the source is a directory;
    /// otherwise the same precondition failures as
    /// [`FileOps::rename`].
    pub fn copy(&self, source: &str, target: &str) -> Result<(), FsError> {
        let (src, dst, src_rel, dst_rel) = self.resolve_pair(source, target)?;

        let meta = fs::metadata(&src).map_err(|e| FsError::from_io(&src_rel, "copy", e))?;
        if meta.is_dir() {
            return Err(FsError::IsADirectory { path: src_rel });
        }

        if fs::symlink_metadata(&dst).is_ok() {
            return Err(FsError::AlreadyExists { path: dst_rel });
        }
        self.require_parent(&dst)?;

        fs::copy(&src, &dst).map_err(|e| FsError::from_io(&dst_rel, "copy", e))?;
        trace!(source = %src_rel, target = %dst_rel, "copied");
        Ok(())
    }

    /// Reads a window of a regular file, decoded as UTF-8.
    ///
    /// The effective length is `min(length, file_size - offset)`; a
    /// zero-length window yields the empty string. Decoding is
    /// best-effort: bytes torn at the window's edges come back as
    /// replacement characters, so callers reading multi-byte text are
    /// responsible for aligning on character boundaries.
    ///
    /// # Errors
    ///
    /// [`FsError::InvalidArgument`] for a negative offset or length,
    /// `length > MAX_READ`, or `offset` beyond the file size;
    /// [`FsError::NotFound`] / [`FsError::NotAFile`] /
    /// [`FsError::AccessDenied`] for the target itself.
    pub fn read(&self, path: &str, offset: i64, length: i64) -> Result<String, FsError> {
        if offset < 0 {
            return Err(FsError::invalid_argument("offset cannot be negative"));
        }
        if length < 0 {
            return Err(FsError::invalid_argument("length cannot be negative"));
        }
        let offset = offset.unsigned_abs();
        let length = length.unsigned_abs();
        if length > MAX_READ {
            return Err(FsError::invalid_argument(format!(
                "length exceeds maximum read size of {MAX_READ} bytes"
            )));
        }

        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);

        let mut file = File::open(&abs).map_err(|e| FsError::from_io(&rel, "read", e))?;
        let meta = file
            .metadata()
            .map_err(|e| FsError::from_io(&rel, "read", e))?;
        if !meta.is_file() {
            return Err(FsError::NotAFile { path: rel });
        }

        let size = meta.len();
        if offset > size {
            return Err(FsError::invalid_argument("offset beyond file size"));
        }

        let effective = length.min(size - offset);
        if effective == 0 {
            return Ok(String::new());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FsError::from_io(&rel, "read", e))?;
        // effective <= MAX_READ, far below usize::MAX on any target.
        #[allow(clippy::cast_possible_truncation)]
        let mut buf = Vec::with_capacity(effective as usize);
        file.take(effective)
            .read_to_end(&mut buf)
            .map_err(|e| FsError::from_io(&rel, "read", e))?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Appends `data` to a file, creating it if absent.
    ///
    /// The only coordinated operation: the write happens under the
    /// lease `file:<relative-path>`, so two concurrent appends of `A`
    /// and `B` produce `AB` or `BA`, never an interleaving, across the
    /// whole fleet. The payload is flushed to durable storage before
    /// the lease is released.
    ///
    /// # Errors
    ///
    /// [`FsError::LockUnavailable`] when the lease cannot be acquired
    /// within the retry budget; I/O failures from the write itself
    /// (the lease is still released).
    pub async fn append(&self, path: &str, data: &str) -> Result<(), FsError> {
        let abs = self.root.resolve(path)?;
        let rel = self.root.relativize(&abs);
        let key = format!("file:{rel}");

        let mut lease: Lease = self.locks.acquire(&key).await?;

        // Release on both branches; a release failure after a
        // successful write is logged inside release(), never surfaced.
        let outcome = append_to_file(&abs, data).map_err(|e| FsError::from_io(&rel, "append", e));
        lease.release().await;
        outcome?;

        trace!(path = %rel, bytes = data.len(), "appended");
        Ok(())
    }

    fn describe(&self, abs: &Path) -> Result<EntryInfo, FsError> {
        let rel = self.root.relativize(abs);
        let meta = fs::metadata(abs).map_err(|e| FsError::from_io(&rel, "stat", e))?;
        Ok(EntryInfo::from_metadata(abs, rel, &meta))
    }

    /// Both paths of a two-path operation resolved, plus the identity
    /// check shared by move and copy.
    fn resolve_pair(
        &self,
        source: &str,
        target: &str,
    ) -> Result<(std::path::PathBuf, std::path::PathBuf, String, String), FsError> {
        let src = self.root.resolve(source)?;
        let dst = self.root.resolve(target)?;
        if src == dst {
            return Err(FsError::invalid_argument(
                "source and target paths cannot be the same",
            ));
        }
        let src_rel = self.root.relativize(&src);
        let dst_rel = self.root.relativize(&dst);
        Ok((src, dst, src_rel, dst_rel))
    }

    fn require_parent(&self, abs: &Path) -> Result<(), FsError> {
        if let Some(parent) = abs.parent() {
            if !parent.exists() {
                return Err(FsError::NotFound {
                    path: self.root.relativize(parent),
                });
            }
        }
        Ok(())
    }
}

/// Open-append-write-fsync, factored out so the lease release wraps a
/// single fallible unit.
fn append_to_file(abs: &Path, data: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(abs)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Recursive copy for the cross-filesystem move fallback.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.is_dir() {
        fs::create_dir(dst)?;
        for dirent in fs::read_dir(src)? {
            let dirent = dirent?;
            copy_tree(&dirent.path(), &dst.join(dirent.file_name()))?;
        }
    } else if meta.file_type().is_symlink() {
        let link_target = fs::read_link(src)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(link_target, dst)?;
        #[cfg(not(unix))]
        return Err(std::io::Error::other("symlink move not supported here"));
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}

fn remove_tree(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
