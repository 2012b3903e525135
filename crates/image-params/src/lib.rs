//! Image request parameters
//!
//! Parses and sanitizes the query parameters of image and content requests.
//! Only the output format is a hard requirement; numeric hints outside their
//! bounds are dropped so the transform falls back to its defaults.

pub mod error;
pub mod format;
pub mod request;
pub mod validation;

pub use error::{Result, ValidationError};
pub use format::ImageFormat;
pub use request::{ContentQuery, ImageParams, ImageQuery};
pub use validation::{
    validate_content_request, validate_image_request, ValidatedContentRequest,
    ValidatedImageRequest, ValidationLimits,
};
