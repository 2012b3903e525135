//! Validation errors for image and content requests

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingRepoId,
    MissingImagePath,
    MissingContentPath,
    MissingImageFormat,
    InvalidImageFormat,
}

impl ValidationError {
    /// Every validation failure is a client error
    pub fn status_code(&self) -> u16 {
        400
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ValidationError::MissingRepoId => "Missing repository ID",
            ValidationError::MissingImagePath => "Missing image path",
            ValidationError::MissingContentPath => "Missing content path",
            ValidationError::MissingImageFormat => "Missing image format",
            ValidationError::InvalidImageFormat => "Invalid image format",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ValidationError {}

pub type Result<T> = std::result::Result<T, ValidationError>;
