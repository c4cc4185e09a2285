//! Configuration system for mfx
//!
//! Reads config from ~/.config/mfx/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mfx_vfs::Profile;
use serde::Deserialize;

/// Editor UI settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Lifetime of transient status bar messages
    pub status_timeout_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            status_timeout_ms: 4000,
        }
    }
}

impl UiConfig {
    pub const fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One `[[profiles]]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    /// Sandbox root for `local` profiles
    pub root: Option<PathBuf>,
    pub encoding: Option<String>,
    pub response_timeout: Option<u64>,
}

impl ProfileConfig {
    pub const LOCAL: &'static str = "local";

    pub fn is_local(&self) -> bool {
        self.profile_type == Self::LOCAL
    }

    /// Key the profile's adapter is registered under
    ///
    /// Local profiles each get their own sandbox, so they are routed by name.
    pub fn backend_key(&self) -> String {
        if self.is_local() {
            format!("{}:{}", Self::LOCAL, self.name)
        } else {
            self.profile_type.clone()
        }
    }

    pub fn to_profile(&self) -> Profile {
        let mut profile = Profile::new(&self.name, self.backend_key());
        profile.encoding.clone_from(&self.encoding);
        profile.response_timeout = self.response_timeout;
        profile
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ui: UiConfig,
    pub logging: LoggingConfig,
    pub profiles: Vec<ProfileConfig>,
}

impl Config {
    /// Load configuration from default path
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mfx")
            .join("config.toml")
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        for (i, profile) in config.profiles.iter().enumerate() {
            if config.profiles[..i].iter().any(|p| p.name == profile.name) {
                anyhow::bail!("duplicate profile '{}'", profile.name);
            }
            if profile.is_local() && profile.root.is_none() {
                anyhow::bail!("local profile '{}' needs a root", profile.name);
            }
        }
        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Create default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<()> {
        Self::create_default_at(&Self::default_config_path())
    }

    pub fn create_default_at(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let default_config = r#"# mfx Configuration

[ui]
# How long transient status messages stay visible
status_timeout_ms = 4000

[logging]
# Used when RUST_LOG is not set
level = "info"

# [[profiles]]
# name = "lpar1"
# type = "local"
# root = "/srv/mirror/lpar1"
# encoding = "IBM-1047"
# response_timeout = 60
"#;
        std::fs::write(path, default_config).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Created default config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ui.status_timeout_ms, 4000);
        assert_eq!(config.logging.level, "info");
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn parses_profiles() {
        let config = Config::parse(
            r#"
[logging]
level = "debug"

[[profiles]]
name = "lpar1"
type = "local"
root = "/srv/lpar1"
encoding = "IBM-1047"

[[profiles]]
name = "prod"
type = "zosmf"
response_timeout = 30
"#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.ui.status_timeout_ms, 4000);

        let lpar1 = config.profile("lpar1").unwrap().to_profile();
        assert_eq!(lpar1.profile_type, "local:lpar1");
        assert_eq!(lpar1.encoding.as_deref(), Some("IBM-1047"));

        let prod = config.profile("prod").unwrap().to_profile();
        assert_eq!(prod.profile_type, "zosmf");
        assert_eq!(prod.response_timeout, Some(30));
    }

    #[test]
    fn rejects_local_profile_without_root() {
        let err = Config::parse("[[profiles]]\nname = \"a\"\ntype = \"local\"\n").unwrap_err();
        assert!(err.to_string().contains("needs a root"));
    }

    #[test]
    fn rejects_duplicate_profiles() {
        let content = "[[profiles]]\nname = \"a\"\ntype = \"zosmf\"\n\n[[profiles]]\nname = \"a\"\ntype = \"ftp\"\n";
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn default_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mfx").join("config.toml");

        Config::create_default_at(&path).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.ui.status_timeout_ms, 4000);

        // existing files are left alone
        std::fs::write(&path, "[ui]\nstatus_timeout_ms = 10\n").unwrap();
        Config::create_default_at(&path).unwrap();
        assert_eq!(Config::load_from_path(&path).unwrap().ui.status_timeout_ms, 10);
    }
}
