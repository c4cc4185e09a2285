//! Error types for the virtual filesystem
//!
//! `VfsError` is what the host editor sees from provider entry points.
//! `BackendError` is what a remote adapter reports; the provider either
//! recovers from it (conflicts) or wraps it in `VfsError::Backend`.

use thiserror::Error;

/// Errors reported by a remote backend adapter
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure talking to the remote system
    #[error("network error: {0}")]
    Network(String),

    /// Credentials were rejected or are missing
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote copy changed since the etag we hold was issued
    #[error("remote version changed (etag {})", .etag.as_deref().unwrap_or("<none>"))]
    Conflict { etag: Option<String> },

    /// Remote resource does not exist
    #[error("remote resource not found: {0}")]
    NotFound(String),

    /// The adapter does not implement this operation
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a Network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Auth(e.to_string()),
            _ => Self::Other(e.to_string()),
        }
    }
}

/// Errors surfaced by the file-provider entry points
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path segment absent from the tree
    #[error("file not found: {0}")]
    NotFound(String),

    /// Expected a directory, found a file
    #[error("not a directory: {0}")]
    FileNotADirectory(String),

    /// Expected a file, found a directory
    #[error("is a directory: {0}")]
    FileIsADirectory(String),

    #[error("file exists: {0}")]
    FileExists(String),

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("no permissions: {0}")]
    NoPermissions(String),

    /// The profile named in the URI could not be resolved
    #[error("profile does not exist for this file: {0}")]
    ProfileNotFound(String),

    /// No backend adapter registered for the profile's type
    #[error("no {scheme} backend registered for profile type '{profile_type}'")]
    Unavailable {
        scheme: String,
        profile_type: String,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(uri: impl ToString) -> Self {
        Self::NotFound(uri.to_string())
    }

    /// Create a FileNotADirectory error.
    pub fn not_a_directory(uri: impl ToString) -> Self {
        Self::FileNotADirectory(uri.to_string())
    }

    /// Create a FileIsADirectory error.
    pub fn is_a_directory(uri: impl ToString) -> Self {
        Self::FileIsADirectory(uri.to_string())
    }

    /// Missing locally, remotely, or by profile
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::ProfileNotFound(_) | Self::Backend(BackendError::NotFound(_))
        )
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Backend(BackendError::Conflict { .. }))
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_detected_through_wrapper() {
        let err: VfsError = BackendError::Conflict {
            etag: Some("abc".into()),
        }
        .into();
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn io_not_found_maps_to_backend_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(BackendError::from(io), BackendError::NotFound(_)));
    }
}
