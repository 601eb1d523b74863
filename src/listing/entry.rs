//! Directory entry model

use chrono::{DateTime, Utc};

/// What a listing line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Devices, pipes and sockets
    Other,
}

impl EntryKind {
    /// Maps the type character of a UNIX permission string
    pub fn from_unix_type(c: char) -> Self {
        match c {
            '-' => EntryKind::File,
            'd' => EntryKind::Directory,
            'l' => EntryKind::Symlink,
            _ => EntryKind::Other,
        }
    }
}

/// One entry of a parsed LIST reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes; 0 for directories in formats that do not report one
    pub size: u64,
    /// Not every listing format carries a usable timestamp
    pub modified: Option<DateTime<Utc>>,
    /// Raw permission string (`drwxr-xr-x`), UNIX listings only
    pub permissions: Option<String>,
    /// Target of a symbolic link
    pub link_target: Option<String>,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            modified: None,
            permissions: None,
            link_target: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Dot-files, including `.` and `..`
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}
