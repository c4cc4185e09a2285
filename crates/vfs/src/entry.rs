//! In-memory entries mirroring remote resources
//!
//! The tree is a closed sum type: every node is a file, a directory, or a
//! filter (a directory that carries listing criteria for its session).
//! A directory owns its children by name, so a node's parent is implied by
//! where it is stored.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use crate::profile::Profile;

/// Listing criteria held by a filter entry (owner, prefix, status...)
pub type FilterCriteria = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePermission {
    Readonly,
}

/// How the remote bytes of a file are encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZosEncoding {
    Text,
    Binary,
    Other { codepage: String },
}

/// Which profile and remote location an entry mirrors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub profile: Option<Arc<Profile>>,
    pub path: String,
}

impl EntryMetadata {
    pub fn new(profile: Option<Arc<Profile>>, path: impl Into<String>) -> Self {
        Self {
            profile,
            path: path.into(),
        }
    }

    /// Metadata for a child named `name` under this location
    pub fn child(&self, name: &str) -> Self {
        Self {
            profile: self.profile.clone(),
            path: join_remote_path(&self.path, name),
        }
    }
}

/// Join a remote directory path and a child name with exactly one `/`
pub fn join_remote_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{name}")
}

/// Snapshot of the remote version taken when a save conflicted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictData {
    pub contents: Vec<u8>,
    pub etag: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub metadata: EntryMetadata,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub size: u64,
    /// Set once contents were fetched; until then `data` is a placeholder
    pub was_accessed: bool,
    pub permissions: Option<FilePermission>,
    /// Last known local content
    pub data: Vec<u8>,
    pub etag: Option<String>,
    /// Present only while a conflict is being resolved
    pub conflict_data: Option<ConflictData>,
    pub encoding: Option<ZosEncoding>,
    /// Edits land in the cache only while the entry is shown in a diff
    pub in_diff_view: bool,
}

impl FileEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            name: name.into(),
            metadata: EntryMetadata::default(),
            ctime: now,
            mtime: now,
            size: 0,
            was_accessed: false,
            permissions: None,
            data: Vec::new(),
            etag: None,
            conflict_data: None,
            encoding: None,
            in_diff_view: false,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the cached content and bump size/mtime
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.size = data.len() as u64;
        self.data = data;
        self.mtime = SystemTime::now();
    }

    /// Drop cached content so the next read goes to the remote
    pub fn invalidate(&mut self) {
        self.data.clear();
        self.was_accessed = false;
    }
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub metadata: EntryMetadata,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    /// Set once the remote listing was merged into `entries`
    pub was_accessed: bool,
    pub permissions: Option<FilePermission>,
    pub entries: HashMap<String, Entry>,
}

impl DirEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            name: name.into(),
            metadata: EntryMetadata::default(),
            ctime: now,
            mtime: now,
            was_accessed: false,
            permissions: None,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add or replace a child under its own name
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        self.mtime = SystemTime::now();
        self.entries.insert(entry.name().to_string(), entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.mtime = SystemTime::now();
        }
        removed
    }

    /// Forget every child and require a fresh listing
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.was_accessed = false;
    }
}

/// A session root: a directory whose listing is scoped by `filter`
#[derive(Debug, Clone)]
pub struct FilterEntry {
    pub dir: DirEntry,
    pub filter: FilterCriteria,
}

impl FilterEntry {
    pub fn new(name: impl Into<String>, filter: FilterCriteria) -> Self {
        Self {
            dir: DirEntry::new(name),
            filter,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Entry {
    File(FileEntry),
    Directory(DirEntry),
    Filter(FilterEntry),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => &f.name,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => &d.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        match self {
            Self::File(f) => f.name = name.into(),
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => d.name = name.into(),
        }
    }

    pub const fn metadata(&self) -> &EntryMetadata {
        match self {
            Self::File(f) => &f.metadata,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => &d.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut EntryMetadata {
        match self {
            Self::File(f) => &mut f.metadata,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => &mut d.metadata,
        }
    }

    pub const fn file_type(&self) -> FileType {
        match self {
            Self::File(_) => FileType::File,
            Self::Directory(_) | Self::Filter(_) => FileType::Directory,
        }
    }

    pub const fn is_file_entry(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Filters are directories too
    pub const fn is_directory_entry(&self) -> bool {
        matches!(self, Self::Directory(_) | Self::Filter(_))
    }

    pub const fn is_filter_entry(&self) -> bool {
        matches!(self, Self::Filter(_))
    }

    pub const fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileEntry> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    pub const fn as_dir(&self) -> Option<&DirEntry> {
        match self {
            Self::File(_) => None,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => Some(d),
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut DirEntry> {
        match self {
            Self::File(_) => None,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => Some(d),
        }
    }

    pub const fn filter(&self) -> Option<&FilterCriteria> {
        match self {
            Self::Filter(f) => Some(&f.filter),
            _ => None,
        }
    }

    pub const fn was_accessed(&self) -> bool {
        match self {
            Self::File(f) => f.was_accessed,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => d.was_accessed,
        }
    }

    pub const fn ctime(&self) -> SystemTime {
        match self {
            Self::File(f) => f.ctime,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => d.ctime,
        }
    }

    pub const fn mtime(&self) -> SystemTime {
        match self {
            Self::File(f) => f.mtime,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => d.mtime,
        }
    }

    /// Byte length for files, 0 for directories
    pub const fn size(&self) -> u64 {
        match self {
            Self::File(f) => f.size,
            Self::Directory(_) | Self::Filter(_) => 0,
        }
    }

    pub const fn permissions(&self) -> Option<FilePermission> {
        match self {
            Self::File(f) => f.permissions,
            Self::Directory(d) | Self::Filter(FilterEntry { dir: d, .. }) => d.permissions,
        }
    }

    /// Point this entry at `path` and rewrite every descendant to match
    pub fn relocate(&mut self, path: String) {
        self.metadata_mut().path = path;
        if let Some(dir) = self.as_dir_mut() {
            let base = dir.metadata.clone();
            for child in dir.entries.values_mut() {
                let child_path = join_remote_path(&base.path, child.name());
                child.metadata_mut().profile.clone_from(&base.profile);
                child.relocate(child_path);
            }
        }
    }
}

impl From<FileEntry> for Entry {
    fn from(entry: FileEntry) -> Self {
        Self::File(entry)
    }
}

impl From<DirEntry> for Entry {
    fn from(entry: DirEntry) -> Self {
        Self::Directory(entry)
    }
}

impl From<FilterEntry> for Entry {
    fn from(entry: FilterEntry) -> Self {
        Self::Filter(entry)
    }
}
