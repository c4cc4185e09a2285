//! Virtual filesystem core for browsing remote mainframe resources
//!
//! Data sets, USS files and job spool output are mirrored into an in-memory
//! entry tree per resource kind. Remote access goes through pluggable
//! [`RemoteBackend`] adapters, editor UI through an [`EditorHost`].

pub mod backend;
pub mod conflict;
pub mod entry;
pub mod error;
pub mod events;
pub mod host;
pub mod lookup;
pub mod memory;
pub mod profile;
pub mod provider;
pub mod save_queue;
pub mod uri;

pub use backend::{
    BackendFactory, BackendRegistry, ContentsOptions, RemoteBackend, RemoteContents, RemoteItem,
    UploadOptions, UploadResult,
};
pub use conflict::ConflictViewSelection;
pub use entry::{
    ConflictData, DirEntry, Entry, EntryMetadata, FileEntry, FilePermission, FileType,
    FilterCriteria, FilterEntry, ZosEncoding,
};
pub use error::{BackendError, VfsError, VfsResult};
pub use events::{FileChangeEvent, FileChangeType};
pub use host::{EditorCommand, EditorHost, HeadlessHost, SavedDocument};
pub use memory::MemoryBackend;
pub use profile::{Profile, ProfileLookup, ProfileRegistry};
pub use provider::{FetchOptions, FileStat, FileSystemProvider, VfsProvider, WriteOptions};
pub use save_queue::{SaveError, SaveQueue, SaveRequest};
pub use uri::{get_info_for_uri, Scheme, UriInfo, VfsUri};
