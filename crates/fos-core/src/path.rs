//! Path resolution against the configured root directory.
//!
//! [`RootDir::resolve`] is the security boundary for the whole service:
//! every caller-supplied path passes through it before any filesystem
//! call. The check is **purely lexical** — `.` and `..` segments are
//! collapsed without consulting the filesystem, and the result must
//! remain under the root. No `realpath` happens before validation:
//! resolving symlinks first would open TOCTOU windows, and the deployed
//! root is expected not to contain attacker-controlled links. Operations
//! that follow links (read, stat) therefore rely on the filesystem to
//! constrain reachability; operations that target the link itself
//! (delete, move) act on the link.
//!
//! # Invariants
//!
//! - Every path returned by [`RootDir::resolve`] satisfies
//!   `path.starts_with(root)`.
//! - [`RootDir::relativize`] output never contains the absolute host
//!   prefix, so descriptors cannot leak it across the wire.

use std::path::{Component, Path, PathBuf};

use crate::error::FsError;

/// The absolute directory bounding all file operations.
///
/// Fixed for the process lifetime; cloning is cheap enough for the
/// handful of owners (operations, health checks).
#[derive(Debug, Clone)]
pub struct RootDir {
    root: PathBuf,
}

impl RootDir {
    /// Wraps an absolute root path.
    ///
    /// The caller is expected to have canonicalized the path (the
    /// configuration layer does); this constructor only rejects
    /// relative paths, which would make the prefix check meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::InvalidArgument`] when `root` is not
    /// absolute.
    pub fn new(root: PathBuf) -> Result<Self, FsError> {
        if !root.is_absolute() {
            return Err(FsError::invalid_argument(format!(
                "root directory must be an absolute path, got {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The absolute root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves a caller-supplied path to an absolute path under the
    /// root.
    ///
    /// The caller path is always treated as relative: leading `/`
    /// separators are stripped before joining, so `"/etc/passwd"`
    /// resolves to `<root>/etc/passwd` rather than escaping. `.`
    /// segments are dropped and `..` pops one component; popping past
    /// the join point means the path escapes.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidArgument`] for empty or whitespace-only
    ///   input.
    /// - [`FsError::PathEscape`] when normalization climbs above the
    ///   root.
    pub fn resolve(&self, caller_path: &str) -> Result<PathBuf, FsError> {
        if caller_path.trim().is_empty() {
            return Err(FsError::invalid_argument("path cannot be null or empty"));
        }

        let relative = caller_path.trim_start_matches('/');
        let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => stack.push(part),
                Component::CurDir => {},
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(FsError::PathEscape {
                            path: caller_path.to_string(),
                        });
                    }
                },
                // RootDir/Prefix cannot appear after the strip above,
                // but treat them as escapes rather than trusting that.
                Component::RootDir | Component::Prefix(_) => {
                    return Err(FsError::PathEscape {
                        path: caller_path.to_string(),
                    });
                },
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(&stack);

        if !resolved.starts_with(&self.root) {
            return Err(FsError::PathEscape {
                path: caller_path.to_string(),
            });
        }

        Ok(resolved)
    }

    /// Produces the descriptor form of an absolute path: root-relative,
    /// `/`-separated, `""` for the root itself.
    ///
    /// Only meaningful for paths previously produced by
    /// [`RootDir::resolve`]; anything else is returned unchanged.
    #[must_use]
    pub fn relativize(&self, abs_path: &Path) -> String {
        match abs_path.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => abs_path.to_string_lossy().into_owned(),
        }
    }
}
