//! Entry descriptors returned by stat and list operations.

use std::fs::Metadata;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metadata record for a single file or directory.
///
/// `path` is always root-relative with `/` separators and no leading
/// `/` or `.`; absolute host paths never cross the wire. `size` passes
/// the filesystem's reported value through, including for directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Final path component.
    pub name: String,
    /// Root-relative path.
    pub path: String,
    /// Byte size as reported by the host filesystem.
    pub size: u64,
}

impl EntryInfo {
    /// Builds a descriptor from a resolved absolute path, its
    /// relativized form, and the entry's metadata.
    #[must_use]
    pub fn from_metadata(abs_path: &Path, relative: String, metadata: &Metadata) -> Self {
        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: relative,
            size: metadata.len(),
        }
    }
}
