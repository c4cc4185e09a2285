//! Base file provider
//!
//! `VfsProvider` owns the entry tree for one resource kind and implements
//! the host-facing `FileSystemProvider` port on top of it. Remote I/O goes
//! through the adapter that the `BackendRegistry` returns for the URI's
//! profile type.
//!
//! The tree sits behind a synchronous lock. Guards are only ever held inside
//! a single synchronous step; every remote call happens with the lock
//! released, and the affected entry is looked up again afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::backend::{BackendRegistry, ContentsOptions, RemoteBackend, UploadOptions};
use crate::entry::{
    join_remote_path, ConflictData, DirEntry, Entry, EntryMetadata, FileEntry, FilePermission,
    FileType, FilterCriteria, FilterEntry, ZosEncoding,
};
use crate::error::{BackendError, VfsError, VfsResult};
use crate::events::FileChangeEvent;
use crate::host::{EditorCommand, EditorHost};
use crate::lookup;
use crate::profile::{Profile, ProfileLookup};
use crate::uri::{get_info_for_uri, Scheme, UriInfo, VfsUri};

/// How long transient status messages stay visible
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_millis(4000);

const EVENT_CAPACITY: usize = 256;

/// File metadata as reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub file_type: FileType,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    pub size: u64,
    pub permissions: Option<FilePermission>,
}

impl FileStat {
    fn of(entry: &Entry, read_only: bool) -> Self {
        Self {
            file_type: entry.file_type(),
            ctime: entry.ctime(),
            mtime: entry.mtime(),
            size: entry.size(),
            permissions: if read_only {
                Some(FilePermission::Readonly)
            } else {
                entry.permissions()
            },
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub create: bool,
    pub overwrite: bool,
}

impl WriteOptions {
    /// Create the file if needed, replace it otherwise
    pub const fn create() -> Self {
        Self {
            create: true,
            overwrite: true,
        }
    }

    /// Replace an existing file only
    pub const fn update() -> Self {
        Self {
            create: false,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Store the remote copy as conflict data instead of replacing `data`
    pub is_conflict: bool,
    /// Re-open and revert the editor showing the file afterwards
    pub reload_editor: bool,
}

/// Host-facing file provider port
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    async fn stat(&self, uri: &VfsUri) -> VfsResult<FileStat>;

    /// Children of a directory, sorted by name
    async fn read_directory(&self, uri: &VfsUri) -> VfsResult<Vec<(String, FileType)>>;

    async fn create_directory(&self, uri: &VfsUri) -> VfsResult<()>;

    async fn read_file(&self, uri: &VfsUri) -> VfsResult<Vec<u8>>;

    async fn write_file(&self, uri: &VfsUri, content: &[u8], options: WriteOptions) -> VfsResult<()>;

    async fn delete(&self, uri: &VfsUri, recursive: bool) -> VfsResult<()>;

    async fn rename(&self, old_uri: &VfsUri, new_uri: &VfsUri, overwrite: bool) -> VfsResult<()>;

    /// Subscribe to batches of change events
    fn watch(&self) -> broadcast::Receiver<Vec<FileChangeEvent>>;

    /// The editor closed the document showing `uri`
    fn on_document_closed(&self, _uri: &VfsUri) {}
}

/// What `write_file` found at the target before talking to the remote
struct WriteTarget {
    metadata: EntryMetadata,
    existing: Option<ExistingFile>,
}

struct ExistingFile {
    was_accessed: bool,
    in_diff_view: bool,
    etag: Option<String>,
    encoding: Option<ZosEncoding>,
}

/// Entry tree plus remote routing for one resource kind
pub struct VfsProvider {
    scheme: Scheme,
    read_only: bool,
    pub(crate) status_timeout: Duration,
    root: RwLock<Entry>,
    opened_uris: Mutex<Vec<VfsUri>>,
    profiles: Arc<dyn ProfileLookup>,
    backends: Arc<BackendRegistry>,
    pub(crate) host: Arc<dyn EditorHost>,
    events: broadcast::Sender<Vec<FileChangeEvent>>,
}

impl VfsProvider {
    pub fn new(
        scheme: Scheme,
        profiles: Arc<dyn ProfileLookup>,
        backends: Arc<BackendRegistry>,
        host: Arc<dyn EditorHost>,
    ) -> Self {
        // the root lists sessions, never the remote
        let mut root = DirEntry::new("");
        root.was_accessed = true;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            scheme,
            read_only: false,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            root: RwLock::new(root.into()),
            opened_uris: Mutex::new(Vec::new()),
            profiles,
            backends,
            host,
            events,
        }
    }

    /// Reject every mutation with `NoPermissions`
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Build a URI in this provider's scheme
    pub fn uri(&self, path: &str) -> VfsUri {
        VfsUri::new(self.scheme.as_str(), path)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tree access
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn tree(&self) -> RwLockReadGuard<'_, Entry> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn tree_mut(&self) -> RwLockWriteGuard<'_, Entry> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn opened(&self) -> MutexGuard<'_, Vec<VfsUri>> {
        self.opened_uris.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the file entry at `uri`
    pub(crate) fn with_file_mut<T>(
        &self,
        uri: &VfsUri,
        f: impl FnOnce(&mut FileEntry) -> T,
    ) -> VfsResult<T> {
        let mut tree = self.tree_mut();
        lookup::lookup_as_file_mut(&mut tree, uri).map(f)
    }

    /// Copy of the entry at `uri`, if present
    pub fn snapshot(&self, uri: &VfsUri) -> Option<Entry> {
        lookup::lookup_silent(&self.tree(), uri).cloned()
    }

    fn emit(&self, events: Vec<FileChangeEvent>) {
        // no subscribers is fine
        let _ = self.events.send(events);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<FileChangeEvent>> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profiles and backends
    // ─────────────────────────────────────────────────────────────────────────

    pub fn info_for(&self, uri: &VfsUri) -> UriInfo {
        get_info_for_uri(uri, self.profiles.as_ref())
    }

    fn require_profile(&self, uri: &VfsUri) -> VfsResult<(UriInfo, Arc<Profile>)> {
        let info = self.info_for(uri);
        match info.profile.clone() {
            Some(profile) => Ok((info, profile)),
            None => Err(VfsError::ProfileNotFound(info.profile_name)),
        }
    }

    /// Metadata for an entry created at `uri`
    pub fn metadata_for_uri(&self, uri: &VfsUri) -> EntryMetadata {
        let info = self.info_for(uri);
        EntryMetadata::new(info.profile.clone(), info.remote_path(uri))
    }

    /// Adapter for `profile`; warns the user when none is registered
    pub async fn backend_for(&self, profile: &Profile) -> VfsResult<Arc<dyn RemoteBackend>> {
        if let Some(backend) = self.backends.get(&profile.profile_type).await? {
            return Ok(backend);
        }

        let err = VfsError::Unavailable {
            scheme: self.scheme.to_string(),
            profile_type: profile.profile_type.clone(),
        };
        tracing::warn!(profile = %profile.name, "{err}");
        self.host.show_warning_message(&err.to_string(), &[]).await;
        Err(err)
    }

    fn upload_options(
        encoding: Option<&ZosEncoding>,
        profile: &Profile,
        etag: Option<String>,
        force_upload: bool,
    ) -> UploadOptions {
        let transfer = ContentsOptions::resolve(encoding, Some(profile));
        UploadOptions {
            etag,
            force_upload,
            encoding: transfer.encoding,
            binary: transfer.binary,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache helpers (never touch the remote)
    // ─────────────────────────────────────────────────────────────────────────

    /// Tree membership only; no fetch is triggered
    pub fn exists(&self, uri: &VfsUri) -> bool {
        lookup::lookup_silent(&self.tree(), uri).is_some()
    }

    /// Evict the entry at `uri` from its parent
    pub fn remove_entry(&self, uri: &VfsUri) -> bool {
        let removed = {
            let mut tree = self.tree_mut();
            lookup::lookup_parent_directory_mut(&mut tree, uri)
                .ok()
                .and_then(|parent| parent.remove(uri.basename()))
                .is_some()
        };
        if removed {
            self.emit(vec![FileChangeEvent::deleted(uri.without_query())]);
        }
        removed
    }

    /// Remember that the editor opened `uri`
    pub fn cache_opened_uri(&self, uri: &VfsUri) {
        self.opened().push(uri.clone());
    }

    pub fn opened_uris(&self) -> Vec<VfsUri> {
        self.opened().clone()
    }

    /// Drop cached file content so the next read fetches again
    pub fn invalidate_file_at_uri(&self, uri: &VfsUri) -> bool {
        {
            let mut tree = self.tree_mut();
            let Some(file) = lookup::lookup_silent_mut(&mut tree, uri).and_then(Entry::as_file_mut) else {
                return false;
            };
            file.invalidate();
        }
        let clean = uri.without_query();
        self.opened().retain(|opened| opened.without_query() != clean);
        true
    }

    /// Forget a directory's children so the next read lists again
    pub fn invalidate_dir_at_uri(&self, uri: &VfsUri) -> bool {
        let mut tree = self.tree_mut();
        match lookup::lookup_silent_mut(&mut tree, uri).and_then(Entry::as_dir_mut) {
            Some(dir) => {
                dir.invalidate();
                true
            }
            None => false,
        }
    }

    /// Make the editor showing `uri` display the refreshed cache
    pub async fn update_resource_in_editor(&self, uri: &VfsUri) {
        let is_file = lookup::lookup_silent(&self.tree(), uri).is_some_and(Entry::is_file_entry);
        if !is_file {
            return;
        }
        self.host.execute_command(EditorCommand::Open(uri.clone())).await;
        self.host.execute_command(EditorCommand::Revert).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions and filters
    // ─────────────────────────────────────────────────────────────────────────

    /// Add the root entry for a profile, scoped by `filter` when given
    ///
    /// An existing session is left untouched.
    pub fn add_session(&self, profile_name: &str, filter: Option<FilterCriteria>) -> VfsResult<VfsUri> {
        let uri = self.uri(&format!("/{profile_name}"));
        let (_, profile) = self.require_profile(&uri)?;
        let metadata = EntryMetadata::new(Some(profile), "/");

        let created = {
            let mut tree = self.tree_mut();
            let root = tree
                .as_dir_mut()
                .ok_or_else(|| VfsError::not_a_directory("/"))?;
            if root.entries.contains_key(profile_name) {
                false
            } else {
                let entry: Entry = match filter {
                    Some(filter) => {
                        let mut session = FilterEntry::new(profile_name, filter);
                        session.dir.metadata = metadata;
                        session.into()
                    }
                    None => DirEntry::new(profile_name).with_metadata(metadata).into(),
                };
                root.insert(entry);
                true
            }
        };

        if created {
            tracing::debug!(uri = %uri, "Added session");
            self.emit(vec![FileChangeEvent::created(uri.clone())]);
        }
        Ok(uri)
    }

    /// Replace a filter entry's criteria; its children are listed again
    pub fn update_filter_for_uri(&self, uri: &VfsUri, filter: FilterCriteria) -> bool {
        let updated = {
            let mut tree = self.tree_mut();
            match lookup::lookup_silent_mut(&mut tree, uri) {
                Some(Entry::Filter(session)) => {
                    session.filter = filter;
                    session.dir.invalidate();
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.emit(vec![FileChangeEvent::changed(uri.without_query())]);
        }
        updated
    }

    /// Put an empty, not-yet-fetched file with `encoding` at `uri`
    ///
    /// Replaces any cached file there, so the next read fetches with the
    /// new encoding.
    pub fn make_empty_file_with_encoding(&self, uri: &VfsUri, encoding: ZosEncoding) -> VfsResult<()> {
        let uri = uri.without_query();
        {
            let mut tree = self.tree_mut();
            let parent = lookup::lookup_parent_directory_mut(&mut tree, &uri)?;
            let mut file = FileEntry::new(uri.basename()).with_metadata(parent.metadata.child(uri.basename()));
            file.encoding = Some(encoding);
            parent.insert(file.into());
        }
        self.emit(vec![FileChangeEvent::changed(uri)]);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull the remote contents of `uri` into its (possibly new) file entry
    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    pub async fn fetch_file_at_uri(&self, uri: &VfsUri, options: FetchOptions) -> VfsResult<()> {
        let uri = uri.without_query();
        let (info, profile) = self.require_profile(&uri)?;
        let backend = self.backend_for(&profile).await?;

        let (path, encoding) = {
            let tree = self.tree();
            match lookup::lookup_silent(&tree, &uri) {
                Some(Entry::File(file)) if !file.metadata.path.is_empty() => {
                    (file.metadata.path.clone(), file.encoding.clone())
                }
                Some(Entry::File(file)) => (info.remote_path(&uri).to_string(), file.encoding.clone()),
                Some(_) => return Err(VfsError::is_a_directory(&uri)),
                None => (info.remote_path(&uri).to_string(), None),
            }
        };

        let transfer = ContentsOptions::resolve(encoding.as_ref(), Some(&profile));
        let remote = backend.get_contents(&path, &transfer).await?;

        {
            let mut tree = self.tree_mut();
            let file = lookup::materialize_file(&mut tree, &uri, |u| self.metadata_for_uri(u))?;
            if options.is_conflict {
                file.conflict_data = Some(ConflictData {
                    contents: remote.contents,
                    etag: remote.etag,
                    size: remote.size,
                });
            } else {
                file.set_data(remote.contents);
                file.etag = remote.etag;
                file.was_accessed = true;
            }
        }

        if options.reload_editor {
            self.update_resource_in_editor(&uri).await;
        }
        self.emit(vec![FileChangeEvent::changed(uri)]);
        Ok(())
    }

    /// Make sure the directory at `uri` exists and has been listed
    ///
    /// Missing ancestors are listed first; a missing profile root becomes
    /// a session.
    fn ensure_listed<'a>(&'a self, uri: &'a VfsUri) -> BoxFuture<'a, VfsResult<()>> {
        async move {
            let accessed = {
                let tree = self.tree();
                match lookup::lookup(&tree, uri) {
                    Ok(entry) => Some(
                        entry
                            .as_dir()
                            .ok_or_else(|| VfsError::not_a_directory(uri))?
                            .was_accessed,
                    ),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                }
            };

            match accessed {
                Some(true) => return Ok(()),
                Some(false) => {}
                None if self.info_for(uri).is_root => {
                    let info = self.info_for(uri);
                    self.add_session(&info.profile_name, None)?;
                }
                None => {
                    self.ensure_listed(&uri.parent()).await?;
                    lookup::lookup_as_directory(&self.tree(), uri)?;
                }
            }

            self.list_remote(uri).await
        }
        .boxed()
    }

    /// Merge the remote listing of `uri` into its directory entry
    async fn list_remote(&self, uri: &VfsUri) -> VfsResult<()> {
        let (info, profile) = self.require_profile(uri)?;
        let backend = self.backend_for(&profile).await?;

        let (metadata, filter) = {
            let tree = self.tree();
            let entry = lookup::lookup(&tree, uri)?;
            (entry.metadata().clone(), entry.filter().cloned())
        };
        let path = if metadata.path.is_empty() {
            info.remote_path(uri).to_string()
        } else {
            metadata.path.clone()
        };
        let child_profile = metadata.profile.clone().or(Some(profile));

        let items = backend.list(&path, filter.as_ref()).await?;
        tracing::debug!(uri = %uri, count = items.len(), "Listed remote directory");

        let mut created = Vec::new();
        {
            let mut tree = self.tree_mut();
            let dir = lookup::lookup_as_directory_mut(&mut tree, uri)?;
            for item in items {
                if item.name == "." || item.name == ".." {
                    continue;
                }
                if dir
                    .entries
                    .get(&item.name)
                    .is_some_and(|existing| existing.file_type() == item.kind)
                {
                    continue;
                }

                let child_metadata =
                    EntryMetadata::new(child_profile.clone(), join_remote_path(&path, &item.name));
                let entry: Entry = match item.kind {
                    FileType::File => FileEntry::new(&item.name).with_metadata(child_metadata).into(),
                    FileType::Directory => DirEntry::new(&item.name).with_metadata(child_metadata).into(),
                };
                created.push(FileChangeEvent::created(uri.join(&item.name)));
                dir.insert(entry);
            }
            dir.was_accessed = true;
        }

        if !created.is_empty() {
            self.emit(created);
        }
        Ok(())
    }

    fn cached_stat(&self, uri: &VfsUri) -> Option<FileStat> {
        lookup::lookup_silent(&self.tree(), uri).map(|entry| FileStat::of(entry, self.read_only))
    }

    /// Inspect the write target and its parent before uploading
    fn write_target(&self, uri: &VfsUri, options: WriteOptions) -> VfsResult<WriteTarget> {
        let tree = self.tree();
        let parent = lookup::lookup_parent_directory(&tree, uri)?;
        match parent.entries.get(uri.basename()) {
            Some(Entry::File(file)) => {
                if options.create && !options.overwrite {
                    return Err(VfsError::FileExists(uri.to_string()));
                }
                Ok(WriteTarget {
                    metadata: file.metadata.clone(),
                    existing: Some(ExistingFile {
                        was_accessed: file.was_accessed,
                        in_diff_view: file.in_diff_view,
                        etag: file.etag.clone(),
                        encoding: file.encoding.clone(),
                    }),
                })
            }
            Some(_) => Err(VfsError::is_a_directory(uri)),
            None if !options.create => Err(VfsError::not_found(uri)),
            None => Ok(WriteTarget {
                metadata: parent.metadata.child(uri.basename()),
                existing: None,
            }),
        }
    }
}

#[async_trait]
impl FileSystemProvider for VfsProvider {
    async fn stat(&self, uri: &VfsUri) -> VfsResult<FileStat> {
        if let Some(stat) = self.cached_stat(uri) {
            return Ok(stat);
        }

        let info = self.info_for(uri);
        if info.is_root {
            self.add_session(&info.profile_name, None)?;
        } else {
            self.ensure_listed(&uri.parent()).await?;
        }
        self.cached_stat(uri).ok_or_else(|| VfsError::not_found(uri))
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    async fn read_directory(&self, uri: &VfsUri) -> VfsResult<Vec<(String, FileType)>> {
        self.ensure_listed(uri).await?;

        let tree = self.tree();
        let dir = lookup::lookup_as_directory(&tree, uri)?;
        let mut children: Vec<(String, FileType)> = dir
            .entries
            .values()
            .map(|entry| (entry.name().to_string(), entry.file_type()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    async fn create_directory(&self, uri: &VfsUri) -> VfsResult<()> {
        if self.read_only {
            return Err(VfsError::NoPermissions(uri.to_string()));
        }
        let uri = uri.without_query();
        let (info, profile) = self.require_profile(&uri)?;
        if info.is_root {
            self.add_session(&info.profile_name, None)?;
            return Ok(());
        }

        let parent = uri.parent();
        if !self.exists(&parent) {
            self.ensure_listed(&parent).await?;
        }
        let metadata = {
            let tree = self.tree();
            let parent_dir = lookup::lookup_as_directory(&tree, &parent)?;
            if parent_dir.entries.contains_key(uri.basename()) {
                return Err(VfsError::FileExists(uri.to_string()));
            }
            parent_dir.metadata.child(uri.basename())
        };

        let backend = self.backend_for(&profile).await?;
        match backend.create_directory(&metadata.path).await {
            Ok(()) | Err(BackendError::Unsupported(_)) => {}
            Err(e) => return Err(e.into()),
        }

        {
            let mut tree = self.tree_mut();
            let parent_dir = lookup::lookup_as_directory_mut(&mut tree, &parent)?;
            let mut dir = DirEntry::new(uri.basename()).with_metadata(metadata);
            // nothing remote to list yet
            dir.was_accessed = true;
            parent_dir.insert(dir.into());
        }
        self.emit(vec![
            FileChangeEvent::changed(parent),
            FileChangeEvent::created(uri),
        ]);
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    async fn read_file(&self, uri: &VfsUri) -> VfsResult<Vec<u8>> {
        self.require_profile(uri)?;
        let clean = uri.without_query();

        if uri.has_query_param("conflict") {
            self.fetch_file_at_uri(
                &clean,
                FetchOptions {
                    is_conflict: true,
                    ..FetchOptions::default()
                },
            )
            .await?;
            let tree = self.tree();
            let file = lookup::lookup_as_file(&tree, &clean)?;
            return Ok(file
                .conflict_data
                .as_ref()
                .map(|conflict| conflict.contents.clone())
                .unwrap_or_default());
        }

        let cached = {
            let tree = self.tree();
            match lookup::lookup_silent(&tree, &clean) {
                Some(Entry::File(file)) => Some(file.was_accessed),
                Some(_) => return Err(VfsError::is_a_directory(&clean)),
                None => None,
            }
        };
        let serve_cached = match cached {
            Some(was_accessed) => was_accessed || uri.has_query_param("inDiff"),
            None => false,
        };
        if !serve_cached {
            self.fetch_file_at_uri(&clean, FetchOptions::default()).await?;
        }

        let tree = self.tree();
        Ok(lookup::lookup_as_file(&tree, &clean)?.data.clone())
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    async fn write_file(&self, uri: &VfsUri, content: &[u8], options: WriteOptions) -> VfsResult<()> {
        if self.read_only {
            return Err(VfsError::NoPermissions(uri.to_string()));
        }
        let (_, profile) = self.require_profile(uri)?;
        let force_upload = uri.has_query_param("forceUpload");
        let diff_edit = uri.has_query_param("inDiff");
        let clean = uri.without_query();
        let parent = clean.parent();
        if !self.exists(&parent) {
            self.ensure_listed(&parent).await?;
        }

        let WriteTarget { metadata, existing } = self.write_target(&clean, options)?;
        let backend = self.backend_for(&profile).await?;

        let Some(existing) = existing else {
            let etag = if content.is_empty() {
                None
            } else {
                let upload = Self::upload_options(None, &profile, None, force_upload);
                backend
                    .upload_from_buffer(content, &metadata.path, &upload)
                    .await?
                    .etag
            };

            {
                let mut tree = self.tree_mut();
                let parent_dir = lookup::lookup_as_directory_mut(&mut tree, &parent)?;
                let mut file = FileEntry::new(clean.basename()).with_metadata(metadata);
                file.set_data(content.to_vec());
                file.etag = etag;
                file.was_accessed = true;
                parent_dir.insert(file.into());
            }
            self.emit(vec![FileChangeEvent::created(clean)]);
            return Ok(());
        };

        if diff_edit || existing.in_diff_view || (!existing.was_accessed && content.is_empty()) {
            self.with_file_mut(&clean, |file| {
                file.set_data(content.to_vec());
                file.in_diff_view |= diff_edit;
            })?;
            self.emit(vec![FileChangeEvent::changed(clean)]);
            return Ok(());
        }

        let etag = if force_upload { None } else { existing.etag };
        let upload = Self::upload_options(existing.encoding.as_ref(), &profile, etag, force_upload);
        match backend.upload_from_buffer(content, &metadata.path, &upload).await {
            Ok(result) => {
                self.with_file_mut(&clean, |file| {
                    file.set_data(content.to_vec());
                    file.etag = result.etag;
                    file.was_accessed = true;
                })?;
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(uri = %clean, error = %e, "Save conflicted with remote changes");
                self.with_file_mut(&clean, |file| file.set_data(content.to_vec()))?;
                self.fetch_file_at_uri(
                    &clean,
                    FetchOptions {
                        is_conflict: true,
                        ..FetchOptions::default()
                    },
                )
                .await?;
                self.handle_conflict(&clean).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.emit(vec![FileChangeEvent::changed(clean)]);
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(uri = %uri))]
    async fn delete(&self, uri: &VfsUri, recursive: bool) -> VfsResult<()> {
        if self.read_only {
            return Err(VfsError::NoPermissions(uri.to_string()));
        }
        let uri = uri.without_query();
        let (info, profile) = self.require_profile(&uri)?;

        let (path, is_dir, listed) = {
            let tree = self.tree();
            let entry = lookup::lookup(&tree, &uri)?;
            (
                entry.metadata().path.clone(),
                entry.is_directory_entry(),
                entry.was_accessed(),
            )
        };
        // an unlisted directory may still have remote children
        if is_dir && !listed && !recursive && !info.is_root {
            self.ensure_listed(&uri).await?;
        }
        let has_children = lookup::lookup_silent(&self.tree(), &uri)
            .and_then(Entry::as_dir)
            .is_some_and(|dir| !dir.entries.is_empty());
        if has_children && !recursive {
            return Err(VfsError::NoPermissions(format!("{uri} is not empty")));
        }

        // closing a session never deletes remote data
        if !info.is_root {
            let backend = self.backend_for(&profile).await?;
            backend.delete(&path, is_dir, recursive).await?;
        }

        self.remove_entry(&uri);
        self.opened().retain(|opened| opened.without_query() != uri);
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(from = %old_uri, to = %new_uri))]
    async fn rename(&self, old_uri: &VfsUri, new_uri: &VfsUri, overwrite: bool) -> VfsResult<()> {
        if self.read_only {
            return Err(VfsError::NoPermissions(old_uri.to_string()));
        }
        let (old_uri, new_uri) = (old_uri.without_query(), new_uri.without_query());
        let (info, profile) = self.require_profile(&old_uri)?;
        if info.is_root || self.info_for(&new_uri).profile_name != info.profile_name {
            return Err(VfsError::NoPermissions(format!("cannot move {old_uri} to {new_uri}")));
        }
        if new_uri == old_uri || new_uri.path().starts_with(&format!("{}/", old_uri.path())) {
            return Err(VfsError::NoPermissions(format!("cannot move {old_uri} into itself")));
        }

        let new_parent = new_uri.parent();
        if !self.exists(&new_parent) {
            self.ensure_listed(&new_parent).await?;
        }
        let (old_path, new_metadata) = {
            let tree = self.tree();
            let entry = lookup::lookup(&tree, &old_uri)?;
            let parent_dir = lookup::lookup_as_directory(&tree, &new_parent)?;
            if parent_dir.entries.contains_key(new_uri.basename()) && !overwrite {
                return Err(VfsError::FileExists(new_uri.to_string()));
            }
            (
                entry.metadata().path.clone(),
                parent_dir.metadata.child(new_uri.basename()),
            )
        };

        let backend = self.backend_for(&profile).await?;
        backend.rename(&old_path, &new_metadata.path).await?;

        {
            let mut tree = self.tree_mut();
            let old_parent = lookup::lookup_parent_directory_mut(&mut tree, &old_uri)?;
            let mut entry = old_parent
                .remove(old_uri.basename())
                .ok_or_else(|| VfsError::not_found(&old_uri))?;
            entry.set_name(new_uri.basename());
            entry.metadata_mut().profile = new_metadata.profile;
            entry.relocate(new_metadata.path);
            lookup::lookup_as_directory_mut(&mut tree, &new_parent)?.insert(entry);
        }

        for opened in self.opened().iter_mut() {
            if opened.without_query() == old_uri {
                *opened = new_uri.clone();
            }
        }
        self.emit(vec![
            FileChangeEvent::deleted(old_uri),
            FileChangeEvent::created(new_uri),
        ]);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<Vec<FileChangeEvent>> {
        self.subscribe()
    }

    fn on_document_closed(&self, uri: &VfsUri) {
        self.close_conflict_view(uri);
    }
}
