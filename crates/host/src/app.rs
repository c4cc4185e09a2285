//! Service graph
//!
//! Everything is built once, explicitly, from a [`Config`]: one profile
//! registry, one provider per resource kind with its own backend registry,
//! a single save queue, and the editor host they all report to.

use std::sync::Arc;

use anyhow::{Context, Result};
use mfx_vfs::{
    BackendRegistry, FileSystemProvider, HeadlessHost, ProfileRegistry, RemoteBackend,
    SaveQueue, SaveRequest, SavedDocument, Scheme, VfsProvider, VfsUri, WriteOptions,
};

use crate::config::{Config, ProfileConfig};
use crate::local::LocalBackend;

/// Directory under a local profile's root holding one resource kind
const fn scheme_dir(scheme: Scheme) -> &'static str {
    match scheme {
        Scheme::DataSet => "datasets",
        Scheme::Uss => "uss",
        Scheme::Jobs => "jobs",
    }
}

pub struct App {
    config: Config,
    host: Arc<HeadlessHost>,
    profiles: Arc<ProfileRegistry>,
    data_sets: Arc<VfsProvider>,
    uss: Arc<VfsProvider>,
    jobs: Arc<VfsProvider>,
    save_queue: SaveQueue,
}

impl App {
    /// Build the service graph; must run inside a tokio runtime
    pub async fn new(config: Config) -> Result<Self> {
        let host = Arc::new(HeadlessHost::new());
        let profiles = Arc::new(ProfileRegistry::with_profiles(
            config.profiles.iter().map(ProfileConfig::to_profile),
        ));

        let mut providers = Vec::with_capacity(Scheme::ALL.len());
        for scheme in Scheme::ALL {
            let backends = Arc::new(Self::backends_for(&config, scheme).await);
            let provider = VfsProvider::new(scheme, profiles.clone(), backends, host.clone())
                .read_only(scheme == Scheme::Jobs)
                .with_status_timeout(config.ui.status_timeout());
            providers.push(Arc::new(provider));
        }
        let [data_sets, uss, jobs]: [Arc<VfsProvider>; 3] = providers
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected one provider per scheme"))?;

        let save_queue = SaveQueue::new(host.clone());
        tracing::info!(profiles = config.profiles.len(), "Services ready");

        Ok(Self {
            config,
            host,
            profiles,
            data_sets,
            uss,
            jobs,
            save_queue,
        })
    }

    async fn backends_for(config: &Config, scheme: Scheme) -> BackendRegistry {
        let backends = BackendRegistry::new();
        for profile in config.profiles.iter().filter(|p| p.is_local()) {
            let Some(root) = &profile.root else {
                continue;
            };
            let root = root.join(scheme_dir(scheme));
            backends
                .register_lazy(
                    profile.backend_key(),
                    Box::new(move || {
                        let backend: Arc<dyn RemoteBackend> = Arc::new(LocalBackend::new(root.clone())?);
                        Ok(backend)
                    }),
                )
                .await;
        }
        backends
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &Arc<HeadlessHost> {
        &self.host
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    pub fn provider(&self, scheme: Scheme) -> &Arc<VfsProvider> {
        match scheme {
            Scheme::DataSet => &self.data_sets,
            Scheme::Uss => &self.uss,
            Scheme::Jobs => &self.jobs,
        }
    }

    /// Parse `uri` and pick the provider serving its scheme
    pub fn resolve(&self, uri: &str) -> Result<(Arc<VfsProvider>, VfsUri)> {
        let uri = VfsUri::parse(uri)?;
        let scheme: Scheme = uri.scheme().parse()?;
        Ok((self.provider(scheme).clone(), uri))
    }

    /// Add a session for every configured profile on every provider
    pub fn open_sessions(&self) -> Result<()> {
        for name in self.profiles.names() {
            for scheme in Scheme::ALL {
                self.provider(scheme)
                    .add_session(&name, None)
                    .with_context(|| format!("opening {scheme} session for {name}"))?;
            }
        }
        Ok(())
    }

    /// Save `contents` to `uri` through the save queue
    pub async fn save(&self, uri: &str, contents: Vec<u8>) -> Result<()> {
        let (provider, uri) = self.resolve(uri)?;
        let provider: Arc<dyn FileSystemProvider> = provider;
        let request = SaveRequest::new(SavedDocument::new(uri), provider, move |document, provider| async move {
            provider
                .write_file(&document.uri, &contents, WriteOptions::create())
                .await?;
            Ok(())
        });
        self.save_queue.push(request);
        self.save_queue.all().await?;
        Ok(())
    }

    pub const fn save_queue(&self) -> &SaveQueue {
        &self.save_queue
    }
}
