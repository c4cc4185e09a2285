use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use mfx_vfs::{
    BackendError, ContentsOptions, FilterCriteria, RemoteBackend, RemoteContents, RemoteItem,
    UploadOptions, UploadResult,
};

/// Local directory backend - serves a profile's resources from a directory
///
/// Stands in for a remote system: etags are derived from modification time
/// and size, so a file changed behind our back conflicts on the next save.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create new local backend with specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root_path = root.into();
        fs::create_dir_all(&root_path)?;
        Ok(Self {
            root: root_path.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` on a blocking thread with `path` resolved inside the sandbox
    async fn with_resolved<T, F>(&self, path: &str, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, BackendError> + Send + 'static,
    {
        let root = self.root.clone();
        let path = path.to_string();
        blocking(move || f(resolve(&root, &path)?)).await
    }
}

/// Resolve a remote path to a filesystem path inside the sandbox
///
/// Rejects `..` outright, and symlinks that lead outside the root.
fn resolve(root: &Path, path: &str) -> Result<PathBuf, BackendError> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(BackendError::Auth(format!("path escapes sandbox: {path}")));
    }
    let target = root.join(relative);

    // canonicalize the deepest existing ancestor
    let mut existing = target.as_path();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    if !existing.canonicalize()?.starts_with(root) {
        return Err(BackendError::Auth(format!(
            "path traversal blocked: {path} escapes sandbox {}",
            root.display()
        )));
    }

    Ok(target)
}

fn etag_of(meta: &fs::Metadata) -> Option<String> {
    let mtime = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("{:x}-{:x}", mtime.as_nanos(), meta.len()))
}

/// `*` matches any run of characters; matching is case-insensitive
fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

async fn blocking<T, F>(f: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::other(e.to_string()))?
}

#[async_trait]
impl RemoteBackend for LocalBackend {
    async fn get_contents(
        &self,
        path: &str,
        _options: &ContentsOptions,
    ) -> Result<RemoteContents, BackendError> {
        self.with_resolved(path, |resolved| {
            let meta = fs::metadata(&resolved)?;
            if meta.is_dir() {
                return Err(BackendError::other(format!("{} is a directory", resolved.display())));
            }
            let contents = fs::read(&resolved)?;
            Ok(RemoteContents::new(contents, etag_of(&meta)))
        })
        .await
    }

    async fn upload_from_buffer(
        &self,
        data: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<UploadResult, BackendError> {
        let data = data.to_vec();
        let options = options.clone();
        self.with_resolved(path, move |resolved| {
            if !options.force_upload {
                if let (Ok(meta), Some(seen)) = (fs::metadata(&resolved), &options.etag) {
                    let current = etag_of(&meta);
                    if current.as_ref() != Some(seen) {
                        return Err(BackendError::Conflict { etag: current });
                    }
                }
            }
            if let Some(parent) = resolved.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&resolved, data)?;
            Ok(UploadResult {
                etag: etag_of(&fs::metadata(&resolved)?),
                success: true,
            })
        })
        .await
    }

    async fn list(
        &self,
        path: &str,
        filter: Option<&FilterCriteria>,
    ) -> Result<Vec<RemoteItem>, BackendError> {
        let pattern = filter.and_then(|f| f.get("pattern")).cloned();
        self.with_resolved(path, move |resolved| {
            let mut items = Vec::new();
            for entry in fs::read_dir(resolved)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if pattern.as_deref().is_some_and(|p| !matches_pattern(&name, p)) {
                    continue;
                }
                if entry.file_type()?.is_dir() {
                    items.push(RemoteItem::directory(name));
                } else {
                    items.push(RemoteItem::file(name));
                }
            }
            items.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(items)
        })
        .await
    }

    async fn delete(&self, path: &str, is_dir: bool, recursive: bool) -> Result<(), BackendError> {
        let root = self.root.clone();
        self.with_resolved(path, move |resolved| {
            if resolved == root {
                return Err(BackendError::Auth("refusing to delete the sandbox root".into()));
            }
            match (is_dir, recursive) {
                (true, true) => fs::remove_dir_all(resolved)?,
                // fails on a non-empty directory
                (true, false) => fs::remove_dir(resolved)?,
                (false, _) => fs::remove_file(resolved)?,
            }
            Ok(())
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), BackendError> {
        let root = self.root.clone();
        let to = to.to_string();
        self.with_resolved(from, move |from| {
            let to = resolve(&root, &to)?;
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(from, to)?;
            Ok(())
        })
        .await
    }

    async fn create_directory(&self, path: &str) -> Result<(), BackendError> {
        self.with_resolved(path, |resolved| {
            fs::create_dir_all(resolved)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn upload_then_read() {
        let (_dir, backend) = backend();
        let written = backend
            .upload_from_buffer(b"hello", "/u/user/a.txt", &UploadOptions::default())
            .await
            .unwrap();

        let read = backend
            .get_contents("/u/user/a.txt", &ContentsOptions::default())
            .await
            .unwrap();
        assert_eq!(read.contents, b"hello");
        assert_eq!(read.size, 5);
        assert_eq!(read.etag, written.etag);
    }

    #[tokio::test]
    async fn stale_etag_conflicts_unless_forced() {
        let (dir, backend) = backend();
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        let stale = UploadOptions {
            etag: Some("0-0".into()),
            ..UploadOptions::default()
        };

        let err = backend.upload_from_buffer(b"two", "/a.txt", &stale).await.unwrap_err();
        assert!(err.is_conflict());

        let forced = UploadOptions {
            force_upload: true,
            ..stale
        };
        backend.upload_from_buffer(b"two", "/a.txt", &forced).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn list_reports_kinds_and_applies_pattern() {
        let (dir, backend) = backend();
        std::fs::create_dir(dir.path().join("USER.DATA")).unwrap();
        std::fs::write(dir.path().join("USER.JCL"), "").unwrap();
        std::fs::write(dir.path().join("SYS1.PROCLIB"), "").unwrap();

        let all = backend.list("/", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&RemoteItem::directory("USER.DATA")));

        let filter = FilterCriteria::from([("pattern".to_string(), "user.*".to_string())]);
        let names: Vec<String> = backend
            .list("/", Some(&filter))
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["USER.DATA", "USER.JCL"]);
    }

    #[tokio::test]
    async fn path_traversal_is_blocked() {
        let (_dir, backend) = backend();
        let result = backend
            .get_contents("/../../etc/passwd", &ContentsOptions::default())
            .await;
        assert!(matches!(result, Err(BackendError::Auth(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_sandbox_is_blocked() {
        let (dir, backend) = backend();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let read = backend
            .get_contents("/link/secret", &ContentsOptions::default())
            .await;
        assert!(matches!(read, Err(BackendError::Auth(_))));

        let write = backend
            .upload_from_buffer(b"y", "/link/new", &UploadOptions::default())
            .await;
        assert!(matches!(write, Err(BackendError::Auth(_))));
        assert!(!outside.path().join("new").exists());
    }

    #[tokio::test]
    async fn rename_and_delete() {
        let (dir, backend) = backend();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        backend.rename("/a.txt", "/sub/b.txt").await.unwrap();
        assert!(dir.path().join("sub/b.txt").exists());

        assert!(backend.delete("/sub", true, false).await.is_err());
        assert!(dir.path().join("sub/b.txt").exists());

        backend.delete("/sub", true, true).await.unwrap();
        assert!(!dir.path().join("sub").exists());

        std::fs::create_dir(dir.path().join("empty")).unwrap();
        backend.delete("/empty", true, false).await.unwrap();
        assert!(!dir.path().join("empty").exists());

        let missing = backend.delete("/nope.txt", false, false).await.unwrap_err();
        assert!(matches!(missing, BackendError::NotFound(_)));
    }

    #[test]
    fn wildcard_matching() {
        assert!(matches_pattern("USER.DATA", "user.*"));
        assert!(matches_pattern("USER.DATA", "*DATA"));
        assert!(matches_pattern("USER.DATA", "U*.D*A"));
        assert!(!matches_pattern("SYS1.DATA", "user.*"));
        assert!(matches_pattern("X", "X"));
        assert!(!matches_pattern("XY", "X"));
    }
}
