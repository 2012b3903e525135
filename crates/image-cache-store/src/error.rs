//! Error types for the image cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "Cache IO error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

/// Failure of a coalesced cache fill
#[derive(Debug)]
pub enum FetchError<E> {
    /// The producer of the cached bytes failed
    Produce(E),
    /// The bytes were produced but could not be stored
    Cache(CacheError),
}

impl<E: fmt::Display> fmt::Display for FetchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Produce(err) => write!(f, "{}", err),
            FetchError::Cache(err) => write!(f, "{}", err),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for FetchError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Produce(err) => Some(err),
            FetchError::Cache(err) => Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let err = CacheError::from(std::io::Error::other("disk full"));
        assert_eq!(format!("{}", err), "Cache IO error: disk full");
    }

    #[test]
    fn test_fetch_error_display_passes_through() {
        let err: FetchError<std::io::Error> =
            FetchError::Produce(std::io::Error::other("decode failed"));
        assert_eq!(format!("{}", err), "decode failed");
    }
}
