//! Request validation
//!
//! A missing or unsupported format is rejected because it selects the
//! encoder. Width, height and quality are hints: values that do not parse or
//! fall outside their bounds are left out instead of failing the request.

use crate::error::{Result, ValidationError};
use crate::format::ImageFormat;
use crate::request::{ContentQuery, ImageParams, ImageQuery};

/// Upper bounds for requested dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_width: 4096,
            max_height: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImageRequest {
    pub repo_id: String,
    pub image_path: String,
    pub params: ImageParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedContentRequest {
    pub repo_id: String,
    pub content_path: String,
}

/// Validate an image request
pub fn validate_image_request(
    repo_id: &str,
    query: &ImageQuery,
    limits: &ValidationLimits,
) -> Result<ValidatedImageRequest> {
    if repo_id.is_empty() {
        return Err(ValidationError::MissingRepoId);
    }

    let image_path = first_present(&query.url, &query.src)
        .filter(|path| !path.is_empty())
        .ok_or(ValidationError::MissingImagePath)?;

    let format: ImageFormat = first_present(&query.f, &query.format)
        .ok_or(ValidationError::MissingImageFormat)?
        .parse()
        .map_err(|_| ValidationError::InvalidImageFormat)?;

    let mut params = ImageParams::new(format);

    params.width = first_present(&query.w, &query.width)
        .and_then(parse_leading_int)
        .filter(|w| (1..=i64::from(limits.max_width)).contains(w))
        .map(|w| w as u32);

    params.height = first_present(&query.h, &query.height)
        .and_then(parse_leading_int)
        .filter(|h| (1..=i64::from(limits.max_height)).contains(h))
        .map(|h| h as u32);

    params.quality = first_present(&query.q, &query.quality)
        .and_then(parse_leading_int)
        .filter(|q| (1..=100).contains(q))
        .map(|q| q as u8);

    Ok(ValidatedImageRequest {
        repo_id: repo_id.to_string(),
        image_path: image_path.to_string(),
        params,
    })
}

/// Validate a content request
pub fn validate_content_request(
    repo_id: &str,
    query: &ContentQuery,
) -> Result<ValidatedContentRequest> {
    if repo_id.is_empty() {
        return Err(ValidationError::MissingRepoId);
    }

    let content_path = first_present(&query.src, &query.url)
        .filter(|path| !path.is_empty())
        .ok_or(ValidationError::MissingContentPath)?;

    Ok(ValidatedContentRequest {
        repo_id: repo_id.to_string(),
        content_path: content_path.to_string(),
    })
}

/// The preferred alias when present, even if empty, otherwise the fallback
fn first_present<'a>(preferred: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    preferred.as_deref().or(fallback.as_deref())
}

/// Parse a leading base-10 integer, ignoring trailing garbage (`"200px"` is 200)
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }

    let value: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -value } else { value })
}
