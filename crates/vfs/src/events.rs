//! File change notifications
//!
//! Providers publish batches of these on a broadcast channel so the host
//! editor can refresh open views.

use crate::uri::VfsUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeType {
    Created,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeType,
    pub uri: VfsUri,
}

impl FileChangeEvent {
    pub const fn created(uri: VfsUri) -> Self {
        Self {
            kind: FileChangeType::Created,
            uri,
        }
    }

    pub const fn changed(uri: VfsUri) -> Self {
        Self {
            kind: FileChangeType::Changed,
            uri,
        }
    }

    pub const fn deleted(uri: VfsUri) -> Self {
        Self {
            kind: FileChangeType::Deleted,
            uri,
        }
    }
}
