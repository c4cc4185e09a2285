//! Connection profiles
//!
//! A profile names a remote system and the kind of adapter used to reach it.
//! The core never loads profiles itself; it asks an injected `ProfileLookup`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A named remote-connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// Adapter kind, e.g. "zosmf", "ftp", "local"
    pub profile_type: String,
    /// Default codepage for text transfers
    pub encoding: Option<String>,
    /// Seconds before a remote call is abandoned by the adapter
    pub response_timeout: Option<u64>,
}

impl Profile {
    pub fn new(name: impl Into<String>, profile_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_type: profile_type.into(),
            encoding: None,
            response_timeout: None,
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Resolves profile names to profiles
///
/// Resolution failure is `None`, never an error.
pub trait ProfileLookup: Send + Sync {
    fn load_named_profile(&self, name: &str) -> Option<Arc<Profile>>;
}

/// In-memory profile table
#[derive(Default)]
pub struct ProfileRegistry {
    profiles: RwLock<HashMap<String, Arc<Profile>>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let registry = Self::new();
        for profile in profiles {
            registry.add(profile);
        }
        registry
    }

    /// Register or replace a profile
    pub fn add(&self, profile: Profile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.name.clone(), Arc::new(profile));
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Profile>> {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Profile names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl ProfileLookup for ProfileRegistry {
    fn load_named_profile(&self, name: &str) -> Option<Arc<Profile>> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_and_removal() {
        let registry = ProfileRegistry::with_profiles([
            Profile::new("lpar2", "zosmf"),
            Profile::new("lpar1", "zosmf").with_encoding("IBM-1047"),
        ]);

        assert_eq!(registry.names(), vec!["lpar1", "lpar2"]);
        let lpar1 = registry.load_named_profile("lpar1").unwrap();
        assert_eq!(lpar1.encoding.as_deref(), Some("IBM-1047"));

        registry.remove("lpar1");
        assert!(registry.load_named_profile("lpar1").is_none());
    }
}
