use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::entry::{FileType, FilterCriteria, ZosEncoding};
use crate::error::BackendError;
use crate::profile::Profile;

/// Options for fetching remote contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentsOptions {
    /// Codepage to convert from, `None` for the adapter's default
    pub encoding: Option<String>,
    /// Transfer bytes untouched
    pub binary: bool,
    pub response_timeout: Option<u64>,
}

impl ContentsOptions {
    /// Entry encoding wins over the profile's default codepage
    pub fn resolve(encoding: Option<&ZosEncoding>, profile: Option<&Profile>) -> Self {
        let profile_encoding = || profile.and_then(|p| p.encoding.clone());
        let (binary, encoding) = match encoding {
            Some(ZosEncoding::Binary) => (true, None),
            Some(ZosEncoding::Other { codepage }) => (false, Some(codepage.clone())),
            Some(ZosEncoding::Text) => (false, None),
            None => (false, profile_encoding()),
        };
        Self {
            encoding,
            binary,
            response_timeout: profile.and_then(|p| p.response_timeout),
        }
    }
}

/// Contents fetched from the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContents {
    pub contents: Vec<u8>,
    pub etag: Option<String>,
    pub size: u64,
}

impl RemoteContents {
    pub fn new(contents: Vec<u8>, etag: Option<String>) -> Self {
        Self {
            size: contents.len() as u64,
            contents,
            etag,
        }
    }
}

/// Options for pushing a buffer to the remote side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Etag the caller last saw; a mismatch is a conflict
    pub etag: Option<String>,
    /// Skip the etag check entirely
    pub force_upload: bool,
    pub encoding: Option<String>,
    pub binary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResult {
    /// Etag of the freshly written version
    pub etag: Option<String>,
    pub success: bool,
}

/// One item of a remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub name: String,
    pub kind: FileType,
}

impl RemoteItem {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::Directory,
        }
    }
}

/// Remote adapter - all byte transfer to and from a remote system goes
/// through this trait
///
/// Each resource kind (data sets, USS, job spool) supplies its own adapter.
/// Default implementations report "not supported" for optional operations,
/// allowing adapters to implement only what their remote API offers.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Fetch the full contents at `path`
    async fn get_contents(
        &self,
        path: &str,
        options: &ContentsOptions,
    ) -> Result<RemoteContents, BackendError>;

    /// Write `data` to `path`, creating it if needed
    ///
    /// Without `force_upload`, a stale `etag` must fail with
    /// `BackendError::Conflict`.
    async fn upload_from_buffer(
        &self,
        data: &[u8],
        path: &str,
        options: &UploadOptions,
    ) -> Result<UploadResult, BackendError>;

    /// List children of `path`, scoped by `filter` for session roots
    async fn list(
        &self,
        path: &str,
        filter: Option<&FilterCriteria>,
    ) -> Result<Vec<RemoteItem>, BackendError>;

    // ─────────────────────────────────────────────────────────────────────────
    // Optional operations with default implementations
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove `path`; a non-empty directory is only removed when `recursive`
    async fn delete(&self, _path: &str, _is_dir: bool, _recursive: bool) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("delete"))
    }

    async fn rename(&self, _from: &str, _to: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("rename"))
    }

    async fn create_directory(&self, _path: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("create_directory"))
    }
}

/// Backend factory for lazy initialization
pub type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn RemoteBackend>, BackendError> + Send + Sync>;

/// Routes profile types to adapters
///
/// One registry serves one resource kind; a provider asks it for the
/// adapter matching the profile of the URI it is handling.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn RemoteBackend>>>,
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter (immediately available)
    pub async fn register(&self, profile_type: impl Into<String>, backend: Arc<dyn RemoteBackend>) {
        let profile_type = profile_type.into();
        tracing::debug!(profile_type = %profile_type, "Registered backend");
        self.factories.write().await.remove(&profile_type);
        self.backends.write().await.insert(profile_type, backend);
    }

    /// Register a factory that builds the adapter on first use
    pub async fn register_lazy(&self, profile_type: impl Into<String>, factory: BackendFactory) {
        self.factories.write().await.insert(profile_type.into(), factory);
    }

    pub async fn remove(&self, profile_type: &str) {
        self.backends.write().await.remove(profile_type);
        self.factories.write().await.remove(profile_type);
    }

    /// Get or initialize the adapter for `profile_type`
    ///
    /// A lazy adapter is built under the write lock, so concurrent callers
    /// wait for it instead of missing it.
    pub async fn get(&self, profile_type: &str) -> Result<Option<Arc<dyn RemoteBackend>>, BackendError> {
        if let Some(backend) = self.backends.read().await.get(profile_type) {
            return Ok(Some(backend.clone()));
        }

        let mut backends = self.backends.write().await;
        if let Some(backend) = backends.get(profile_type) {
            return Ok(Some(backend.clone()));
        }
        let mut factories = self.factories.write().await;
        let Some(factory) = factories.get(profile_type) else {
            return Ok(None);
        };
        let backend = factory()?;
        factories.remove(profile_type);
        backends.insert(profile_type.to_string(), backend.clone());
        tracing::debug!(profile_type, "Initialized lazy backend");
        Ok(Some(backend))
    }

    /// Registered profile types, sorted
    pub async fn profile_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.read().await.keys().cloned().collect();
        names.extend(self.factories.read().await.keys().cloned());
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn entry_encoding_beats_profile_default() {
        let profile = Profile::new("lpar1", "zosmf").with_encoding("IBM-1047");

        let opts = ContentsOptions::resolve(None, Some(&profile));
        assert_eq!(opts.encoding.as_deref(), Some("IBM-1047"));

        let opts = ContentsOptions::resolve(Some(&ZosEncoding::Binary), Some(&profile));
        assert!(opts.binary);
        assert!(opts.encoding.is_none());

        let other = ZosEncoding::Other {
            codepage: "IBM-037".into(),
        };
        let opts = ContentsOptions::resolve(Some(&other), Some(&profile));
        assert_eq!(opts.encoding.as_deref(), Some("IBM-037"));
    }

    #[tokio::test]
    async fn lazy_backend_is_built_once() {
        let registry = BackendRegistry::new();
        registry
            .register_lazy("zosmf", Box::new(|| Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RemoteBackend>)))
            .await;

        assert_eq!(registry.profile_types().await, vec!["zosmf"]);
        let first = registry.get("zosmf").await.unwrap().unwrap();
        let second = registry.get("zosmf").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get("ftp").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_gets_wait_for_lazy_backend() {
        let registry = Arc::new(BackendRegistry::new());
        registry
            .register_lazy(
                "zosmf",
                Box::new(|| {
                    std::thread::sleep(std::time::Duration::from_millis(200));
                    Ok(Arc::new(MemoryBackend::new()) as Arc<dyn RemoteBackend>)
                }),
            )
            .await;

        let building = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get("zosmf").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let second = registry.get("zosmf").await.unwrap();
        let first = building.await.unwrap().unwrap();

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn failing_factory_reports_error() {
        let registry = BackendRegistry::new();
        registry
            .register_lazy("ftp", Box::new(|| Err(BackendError::network("unreachable"))))
            .await;
        assert!(registry.get("ftp").await.is_err());
        // still registered, so the next use retries
        assert!(registry.get("ftp").await.is_err());
        assert_eq!(registry.profile_types().await, vec!["ftp"]);
    }
}
