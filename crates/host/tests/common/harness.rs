use std::path::PathBuf;

use anyhow::Result;
use mfx_host::app::App;
use mfx_host::config::{Config, ProfileConfig};
use tempfile::TempDir;

/// Temp directory mirroring one local profile, `lpar1`
pub struct TestHarness {
    pub tmp_dir: TempDir,
}

impl TestHarness {
    pub const PROFILE: &'static str = "lpar1";

    pub fn new() -> Result<Self> {
        Ok(Self {
            tmp_dir: tempfile::tempdir()?,
        })
    }

    pub fn config(&self) -> Config {
        Config {
            profiles: vec![ProfileConfig {
                name: Self::PROFILE.into(),
                profile_type: ProfileConfig::LOCAL.into(),
                root: Some(self.tmp_dir.path().to_path_buf()),
                encoding: Some("IBM-1047".into()),
                response_timeout: None,
            }],
            ..Config::default()
        }
    }

    /// Service graph over the harness directory, sessions opened
    pub async fn app(&self) -> Result<App> {
        let app = App::new(self.config()).await?;
        app.open_sessions()?;
        Ok(app)
    }

    /// Path on disk for `name` under the `uss` tree
    pub fn uss_path(&self, name: &str) -> PathBuf {
        self.tmp_dir.path().join("uss").join(name)
    }

    pub fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.uss_path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.uss_path(name))?)
    }
}
