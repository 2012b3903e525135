//! Error types for asset path resolution

use std::fmt;

#[derive(Debug)]
pub enum ResolveError {
    RepoNotFound(String),
    AssetPathInvalid,
    AssetNotFound,
    Io(Box<std::io::Error>),
}

impl ResolveError {
    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            ResolveError::RepoNotFound(_) | ResolveError::AssetNotFound => 404,
            ResolveError::AssetPathInvalid => 400,
            ResolveError::Io(_) => 500,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::RepoNotFound(id) => write!(f, "Repository '{}' not found", id),
            ResolveError::AssetPathInvalid => write!(f, "Invalid asset path"),
            ResolveError::AssetNotFound => write!(f, "Asset not found"),
            ResolveError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(err: std::io::Error) -> Self {
        ResolveError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
