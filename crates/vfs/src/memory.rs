//! In-memory remote backend for testing
//!
//! Behaves like a remote system that versions every file with an etag and
//! rejects stale uploads. Every call is recorded so tests can assert on
//! exactly what reached the "remote" side.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::backend::{
    ContentsOptions, RemoteBackend, RemoteContents, RemoteItem, UploadOptions, UploadResult,
};
use crate::entry::FilterCriteria;
use crate::error::BackendError;

/// A stored remote file
#[derive(Clone, Debug)]
struct MemoryFile {
    data: Vec<u8>,
    version: u64,
}

impl MemoryFile {
    fn etag(&self) -> String {
        format!("v{}", self.version)
    }
}

/// One upload as seen by the backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedUpload {
    pub path: String,
    pub data: Vec<u8>,
    pub etag: Option<String>,
    pub force_upload: bool,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
    uploads: Vec<RecordedUpload>,
    fetches: Vec<String>,
    listings: Vec<(String, Option<FilterCriteria>)>,
    offline: bool,
}

/// Etag-checking, call-recording backend
///
/// Data is lost when the backend is dropped.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial file contents; parent directories are implied
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let backend = Self::new();
        for (path, data) in files {
            backend.put_remote(path, data);
        }
        backend
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change a file behind the provider's back (bumps its etag)
    pub fn put_remote(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        let mut state = self.state();
        add_parents(&mut state.dirs, &path);
        let version = state.files.get(&path).map_or(1, |f| f.version + 1);
        state.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                version,
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.state();
        add_parents(&mut state.dirs, &path);
        state.dirs.insert(path);
    }

    /// Current remote bytes at `path`
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(&normalize(path)).map(|f| f.data.clone())
    }

    pub fn etag(&self, path: &str) -> Option<String> {
        self.state().files.get(&normalize(path)).map(MemoryFile::etag)
    }

    /// Make every call fail with a network error
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state().uploads.clone()
    }

    /// Paths passed to `get_contents`, in call order
    pub fn fetches(&self) -> Vec<String> {
        self.state().fetches.clone()
    }

    pub fn listings(&self) -> Vec<(String, Option<FilterCriteria>)> {
        self.state().listings.clone()
    }

    fn check_online(state: &State) -> Result<(), BackendError> {
        if state.offline {
            return Err(BackendError::network("remote system unreachable"));
        }
        Ok(())
    }
}

/// Ensure leading `/`, no trailing `/`
fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{trimmed}")
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn add_parents(dirs: &mut BTreeSet<String>, path: &str) {
    let mut current = parent_of(path);
    while current != "/" {
        dirs.insert(current.to_string());
        current = parent_of(current);
    }
}

fn is_under(path: &str, dir: &str) -> bool {
    dir == "/" || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn get_contents(
        &self,
        path: &str,
        _options: &ContentsOptions,
    ) -> Result<RemoteContents, BackendError> {
        let path = normalize(path);
        let mut state = self.state();
        state.fetches.push(path.clone());
        Self::check_online(&state)?;

        match state.files.get(&path) {
            Some(file) => Ok(RemoteContents::new(file.data.clone(), Some(file.etag()))),
            None => Err(BackendError::NotFound(path)),
        }
    }

    async fn upload_from_buffer(
        &self,
        data: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<UploadResult, BackendError> {
        let path = normalize(path);
        let mut state = self.state();
        Self::check_online(&state)?;

        let current = state.files.get(&path).map(MemoryFile::etag);
        if !options.force_upload {
            if let (Some(current), Some(seen)) = (&current, &options.etag) {
                if current != seen {
                    return Err(BackendError::Conflict {
                        etag: Some(current.clone()),
                    });
                }
            }
        }

        state.uploads.push(RecordedUpload {
            path: path.clone(),
            data: data.to_vec(),
            etag: options.etag.clone(),
            force_upload: options.force_upload,
        });
        add_parents(&mut state.dirs, &path);
        let version = state.files.get(&path).map_or(1, |f| f.version + 1);
        let file = MemoryFile {
            data: data.to_vec(),
            version,
        };
        let etag = file.etag();
        state.files.insert(path, file);

        Ok(UploadResult {
            etag: Some(etag),
            success: true,
        })
    }

    async fn list(
        &self,
        path: &str,
        filter: Option<&FilterCriteria>,
    ) -> Result<Vec<RemoteItem>, BackendError> {
        let path = normalize(path);
        let mut state = self.state();
        state.listings.push((path.clone(), filter.cloned()));
        Self::check_online(&state)?;

        if path != "/" && !state.dirs.contains(&path) {
            return Err(BackendError::NotFound(path));
        }

        let name_of = |child: &str| child.rsplit('/').next().unwrap_or_default().to_string();
        let mut items: Vec<RemoteItem> = state
            .dirs
            .iter()
            .filter(|d| parent_of(d) == path)
            .map(|d| RemoteItem::directory(name_of(d)))
            .collect();
        items.extend(
            state
                .files
                .keys()
                .filter(|f| parent_of(f) == path)
                .map(|f| RemoteItem::file(name_of(f))),
        );
        Ok(items)
    }

    async fn delete(&self, path: &str, is_dir: bool, recursive: bool) -> Result<(), BackendError> {
        let path = normalize(path);
        let mut state = self.state();
        Self::check_online(&state)?;

        if is_dir {
            if !state.dirs.contains(&path) {
                return Err(BackendError::NotFound(path));
            }
            let has_children = state.dirs.iter().any(|d| is_under(d, &path))
                || state.files.keys().any(|f| is_under(f, &path));
            if has_children && !recursive {
                return Err(BackendError::other(format!("directory not empty: {path}")));
            }
            state.dirs.remove(&path);
            state.dirs.retain(|d| !is_under(d, &path));
            state.files.retain(|f, _| !is_under(f, &path));
            return Ok(());
        }

        state
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or(BackendError::NotFound(path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let (from, to) = (normalize(from), normalize(to));
        let mut state = self.state();
        Self::check_online(&state)?;

        if let Some(file) = state.files.remove(&from) {
            add_parents(&mut state.dirs, &to);
            state.files.insert(to, file);
            return Ok(());
        }
        if !state.dirs.contains(&from) {
            return Err(BackendError::NotFound(from));
        }

        let moved = |p: &str| format!("{to}{}", &p[from.len()..]);
        let dirs: Vec<String> = state
            .dirs
            .iter()
            .filter(|d| **d == from || is_under(d, &from))
            .cloned()
            .collect();
        for dir in dirs {
            state.dirs.remove(&dir);
            state.dirs.insert(moved(&dir));
        }
        let files: Vec<String> = state
            .files
            .keys()
            .filter(|f| is_under(f, &from))
            .cloned()
            .collect();
        for old in files {
            if let Some(file) = state.files.remove(&old) {
                state.files.insert(moved(&old), file);
            }
        }
        Ok(())
    }

    async fn create_directory(&self, path: &str) -> Result<(), BackendError> {
        let path = normalize(path);
        let mut state = self.state();
        Self::check_online(&state)?;
        add_parents(&mut state.dirs, &path);
        state.dirs.insert(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_etag_is_a_conflict() {
        let backend = MemoryBackend::with_files([("/u/me/a.txt", b"one".as_slice())]);
        let first = backend
            .get_contents("/u/me/a.txt", &ContentsOptions::default())
            .await
            .unwrap();
        assert_eq!(first.etag.as_deref(), Some("v1"));

        backend.put_remote("/u/me/a.txt", b"changed elsewhere");

        let stale = UploadOptions {
            etag: first.etag.clone(),
            ..Default::default()
        };
        let err = backend
            .upload_from_buffer(b"mine", "/u/me/a.txt", &stale)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let forced = UploadOptions {
            force_upload: true,
            ..stale
        };
        let result = backend
            .upload_from_buffer(b"mine", "/u/me/a.txt", &forced)
            .await
            .unwrap();
        assert_eq!(result.etag.as_deref(), Some("v3"));
        assert_eq!(backend.contents("/u/me/a.txt").unwrap(), b"mine");
        assert_eq!(backend.uploads().len(), 1);
    }

    #[tokio::test]
    async fn list_returns_direct_children() {
        let backend = MemoryBackend::with_files([
            ("/u/me/a.txt", b"a".as_slice()),
            ("/u/me/sub/b.txt", b"b".as_slice()),
        ]);
        let mut names: Vec<String> = backend
            .list("/u/me", None)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert!(backend.list("/nope", None).await.is_err());
    }

    #[tokio::test]
    async fn rename_moves_directory_contents() {
        let backend = MemoryBackend::with_files([("/u/old/f.txt", b"x".as_slice())]);
        backend.rename("/u/old", "/u/new").await.unwrap();
        assert!(backend.contents("/u/old/f.txt").is_none());
        assert_eq!(backend.contents("/u/new/f.txt").unwrap(), b"x");

        backend.delete("/u/new", true, true).await.unwrap();
        assert!(backend.contents("/u/new/f.txt").is_none());
    }

    #[tokio::test]
    async fn non_recursive_delete_keeps_populated_directory() {
        let backend = MemoryBackend::with_files([("/u/dir/f.txt", b"x".as_slice())]);
        backend.add_dir("/u/empty");

        assert!(backend.delete("/u/dir", true, false).await.is_err());
        assert_eq!(backend.contents("/u/dir/f.txt").unwrap(), b"x");

        backend.delete("/u/empty", true, false).await.unwrap();
        assert!(backend.list("/u/empty", None).await.is_err());
    }

    #[tokio::test]
    async fn offline_backend_fails_with_network_error() {
        let backend = MemoryBackend::with_files([("/a", b"a".as_slice())]);
        backend.set_offline(true);
        let err = backend
            .get_contents("/a", &ContentsOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Network(_)));
    }
}
