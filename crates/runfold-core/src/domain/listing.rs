//! Artifact listing: the payload a successful fetch produces for one run.

use serde::{Deserialize, Serialize};

/// One entry of an artifact listing.
///
/// `file_size` is absent for directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,

    #[serde(default)]
    pub is_dir: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, file_size: u64) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            file_size: Some(file_size),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            file_size: None,
        }
    }
}

/// Files rooted at one location, associated with one run.
///
/// An empty `files` list is still a successful listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub root_uri: String,

    #[serde(default)]
    pub files: Vec<FileInfo>,
}

impl ArtifactListing {
    pub fn new(root_uri: impl Into<String>, files: Vec<FileInfo>) -> Self {
        Self {
            root_uri: root_uri.into(),
            files,
        }
    }

    pub fn with_file(mut self, file: FileInfo) -> Self {
        self.files.push(file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of the known sizes of regular files.
    pub fn total_size(&self) -> u64 {
        self.regular_files().filter_map(|f| f.file_size).sum()
    }

    pub fn directories(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| f.is_dir)
    }

    pub fn regular_files(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| !f.is_dir)
    }
}
