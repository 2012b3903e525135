//! Error types for image transformation

use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum TransformError {
    Io(Box<std::io::Error>),
    Image(Box<image::ImageError>),
    /// Source exists but its format cannot be decoded
    UnsupportedSource(String),
    Timeout(Duration),
    /// The blocking worker panicked or was cancelled
    Worker(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Io(err) => write!(f, "IO error: {}", err),
            TransformError::Image(err) => write!(f, "Image error: {}", err),
            TransformError::UnsupportedSource(msg) => {
                write!(f, "Unsupported source image: {}", msg)
            }
            TransformError::Timeout(after) => {
                write!(f, "Transform timed out after {}s", after.as_secs_f64())
            }
            TransformError::Worker(msg) => write!(f, "Transform worker failed: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransformError::Io(err) => Some(err.as_ref()),
            TransformError::Image(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransformError {
    fn from(err: std::io::Error) -> Self {
        TransformError::Io(Box::new(err))
    }
}

impl From<image::ImageError> for TransformError {
    fn from(err: image::ImageError) -> Self {
        TransformError::Image(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for TransformError {
    fn from(err: tokio::task::JoinError) -> Self {
        TransformError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = TransformError::Timeout(Duration::from_millis(1500));
        assert_eq!(format!("{}", err), "Transform timed out after 1.5s");
    }

    #[test]
    fn test_worker_display() {
        let err = TransformError::Worker("panicked".to_string());
        assert_eq!(format!("{}", err), "Transform worker failed: panicked");
    }
}
