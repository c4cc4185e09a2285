//! Virtual resource identifiers and profile resolution
//!
//! Resources are addressed as `<scheme>:/<profileName>/<remote path...>`,
//! optionally followed by `?query` markers (`forceUpload`, `conflict`,
//! `inDiff`). The scheme only routes to a provider; the core never
//! interprets it beyond parsing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::VfsError;
use crate::profile::{Profile, ProfileLookup};

/// Resource kinds, one provider per scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    DataSet,
    Uss,
    Jobs,
}

impl Scheme {
    pub const ALL: [Self; 3] = [Self::DataSet, Self::Uss, Self::Jobs];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataSet => "zowe-ds",
            Self::Uss => "zowe-uss",
            Self::Jobs => "zowe-jobs",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| VfsError::InvalidUri(format!("unknown scheme: {s}")))
    }
}

/// A scheme-qualified virtual path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsUri {
    scheme: String,
    path: String,
    query: String,
}

impl VfsUri {
    /// Build a URI; the path is normalized to start with `/`
    pub fn new(scheme: impl Into<String>, path: &str) -> Self {
        Self {
            scheme: scheme.into(),
            path: normalize_path(path),
            query: String::new(),
        }
    }

    /// Parse `scheme:/path?query`
    pub fn parse(input: &str) -> Result<Self, VfsError> {
        let (scheme, rest) = input
            .split_once(':')
            .ok_or_else(|| VfsError::InvalidUri(input.to_string()))?;
        if scheme.is_empty() || scheme.contains('/') {
            return Err(VfsError::InvalidUri(input.to_string()));
        }
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        Ok(Self {
            scheme: scheme.to_string(),
            path: normalize_path(path),
            query: query.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path: normalize_path(path),
            query: self.query.clone(),
        }
    }

    #[must_use]
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path: self.path.clone(),
            query: query.into(),
        }
    }

    /// Same location, no query markers
    #[must_use]
    pub fn without_query(&self) -> Self {
        self.with_query(String::new())
    }

    /// Whether `key` appears in the query, with or without a value
    pub fn has_query_param(&self, key: &str) -> bool {
        self.query
            .split('&')
            .any(|pair| pair.split_once('=').map_or(pair, |(k, _)| k) == key)
    }

    /// Non-empty path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Last path segment (empty for `/`)
    pub fn basename(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// URI of the containing directory (`/` stays `/`)
    #[must_use]
    pub fn parent(&self) -> Self {
        let parent = match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &self.path[..idx],
        };
        self.with_path(parent).without_query()
    }

    /// Child URI with `name` appended
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        self.with_path(&format!("{base}/{name}")).without_query()
    }
}

impl fmt::Display for VfsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

impl FromStr for VfsUri {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Ensure leading `/`, drop trailing `/` (except for root)
fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Structured view of a virtual URI
#[derive(Debug, Clone)]
pub struct UriInfo {
    /// Path is exactly `/<profileName>`
    pub is_root: bool,
    /// Index of the first `/` after position 0, if any
    pub slash_after_profile_pos: Option<usize>,
    pub profile_name: String,
    /// `None` when the profile lookup does not know the name
    pub profile: Option<Arc<Profile>>,
}

impl UriInfo {
    /// Remote path for the URI: everything after the profile segment
    pub fn remote_path<'a>(&self, uri: &'a VfsUri) -> &'a str {
        self.slash_after_profile_pos
            .map_or("/", |pos| &uri.path()[pos..])
    }
}

/// Split a URI into profile name and root-ness, resolving the profile
pub fn get_info_for_uri(uri: &VfsUri, profiles: &dyn ProfileLookup) -> UriInfo {
    let path = uri.path();
    let slash_after_profile_pos = path.get(1..).and_then(|rest| rest.find('/')).map(|i| i + 1);
    let profile_name = match slash_after_profile_pos {
        Some(pos) => &path[1..pos],
        None => path.get(1..).unwrap_or(""),
    }
    .to_string();
    let profile = profiles.load_named_profile(&profile_name);

    UriInfo {
        is_root: slash_after_profile_pos.is_none(),
        slash_after_profile_pos,
        profile_name,
        profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileRegistry;

    fn registry() -> ProfileRegistry {
        ProfileRegistry::with_profiles([Profile::new("lpar1", "zosmf")])
    }

    #[test]
    fn parse_and_display() {
        let uri = VfsUri::parse("zowe-uss:/lpar1/u/me/file.txt?forceUpload=true").unwrap();
        assert_eq!(uri.scheme(), "zowe-uss");
        assert_eq!(uri.path(), "/lpar1/u/me/file.txt");
        assert!(uri.has_query_param("forceUpload"));
        assert!(!uri.has_query_param("conflict"));
        assert_eq!(uri.to_string(), "zowe-uss:/lpar1/u/me/file.txt?forceUpload=true");
        assert!(VfsUri::parse("no-scheme-here").is_err());
    }

    #[test]
    fn parent_basename_join() {
        let uri = VfsUri::new("zowe-ds", "/lpar1/USER.DATA/MEMBER");
        assert_eq!(uri.basename(), "MEMBER");
        assert_eq!(uri.parent().path(), "/lpar1/USER.DATA");
        assert_eq!(uri.parent().parent().parent().path(), "/");
        assert_eq!(uri.parent().join("OTHER").path(), "/lpar1/USER.DATA/OTHER");
    }

    #[test]
    fn root_uri_is_detected() {
        let info = get_info_for_uri(&VfsUri::new("zowe-uss", "/lpar1"), &registry());
        assert!(info.is_root);
        assert_eq!(info.slash_after_profile_pos, None);
        assert_eq!(info.profile_name, "lpar1");
        assert!(info.profile.is_some());
    }

    #[test]
    fn nested_uri_reports_slash_position() {
        let uri = VfsUri::new("zowe-uss", "/lpar1/sub/path");
        let info = get_info_for_uri(&uri, &registry());
        assert!(!info.is_root);
        assert_eq!(info.slash_after_profile_pos, Some(6));
        assert_eq!(info.profile_name, "lpar1");
        assert_eq!(info.remote_path(&uri), "/sub/path");
    }

    #[test]
    fn unknown_profile_resolves_to_none() {
        let info = get_info_for_uri(&VfsUri::new("zowe-jobs", "/nope/JOB1"), &registry());
        assert_eq!(info.profile_name, "nope");
        assert!(info.profile.is_none());
    }

    #[test]
    fn scheme_round_trips_through_str() {
        for scheme in Scheme::ALL {
            assert_eq!(scheme.as_str().parse::<Scheme>().unwrap(), scheme);
        }
    }
}
