//! Error types for the asset CDN

use crate::config::ConfigError;
use asset_repository::ResolveError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use image_cache_store::{CacheError, FetchError};
use image_params::ValidationError;
use image_transform::TransformError;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Startup failures that abort `main`
#[derive(Debug)]
pub enum CdnError {
    Config(ConfigError),
    Cache(CacheError),
    Io(Box<std::io::Error>),
    HttpClient(Box<reqwest::Error>),
    Logging(String),
}

impl fmt::Display for CdnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdnError::Config(err) => write!(f, "Configuration error: {}", err),
            CdnError::Cache(err) => write!(f, "{}", err),
            CdnError::Io(err) => write!(f, "IO error: {}", err),
            CdnError::HttpClient(err) => write!(f, "HTTP client error: {}", err),
            CdnError::Logging(msg) => write!(f, "Logging setup failed: {}", msg),
        }
    }
}

impl std::error::Error for CdnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CdnError::Config(err) => Some(err),
            CdnError::Cache(err) => Some(err),
            CdnError::Io(err) => Some(err.as_ref()),
            CdnError::HttpClient(err) => Some(err.as_ref()),
            CdnError::Logging(_) => None,
        }
    }
}

impl From<ConfigError> for CdnError {
    fn from(err: ConfigError) -> Self {
        CdnError::Config(err)
    }
}

impl From<CacheError> for CdnError {
    fn from(err: CacheError) -> Self {
        CdnError::Cache(err)
    }
}

impl From<std::io::Error> for CdnError {
    fn from(err: std::io::Error) -> Self {
        CdnError::Io(Box::new(err))
    }
}

impl From<reqwest::Error> for CdnError {
    fn from(err: reqwest::Error) -> Self {
        CdnError::HttpClient(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for CdnError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CdnError::Logging(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdnError>;

/// Request failures, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Resolve(ResolveError),
    Transform(String),
    UnsupportedSource(String),
    TransformTimeout(Duration),
    Cache(String),
    Io(std::io::Error),
    Http(axum::http::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(err) => status_from_u16(err.status_code()),
            AppError::Resolve(err) => status_from_u16(err.status_code()),
            AppError::UnsupportedSource(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::TransformTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transform(_) | AppError::Cache(_) | AppError::Io(_) | AppError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(err) => write!(f, "{}", err),
            AppError::Resolve(err) => write!(f, "{}", err),
            AppError::Transform(msg) => write!(f, "Image processing failed: {}", msg),
            AppError::UnsupportedSource(msg) => write!(f, "Unsupported source image: {}", msg),
            AppError::TransformTimeout(after) => {
                write!(f, "Image processing timed out after {}s", after.as_secs_f64())
            }
            AppError::Cache(msg) => write!(f, "{}", msg),
            AppError::Io(err) => write!(f, "IO error: {}", err),
            AppError::Http(err) => write!(f, "Response error: {}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Validation(err) => err.to_string(),
            AppError::Resolve(ResolveError::Io(err)) => {
                tracing::error!(error = %err, "Asset resolution failed");
                "Internal server error".to_string()
            }
            AppError::Resolve(err) => err.to_string(),
            AppError::Transform(msg) => {
                tracing::error!(error = %msg, "Image processing failed");
                "Image processing failed".to_string()
            }
            AppError::UnsupportedSource(msg) => {
                tracing::warn!(error = %msg, "Source image cannot be decoded");
                "Unsupported source image format".to_string()
            }
            AppError::TransformTimeout(after) => {
                tracing::error!(timeout_secs = after.as_secs_f64(), "Image processing timed out");
                "Image processing timed out".to_string()
            }
            AppError::Cache(_) | AppError::Io(_) | AppError::Http(_) => {
                tracing::error!(error = %self, "Internal server error");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        AppError::Resolve(err)
    }
}

impl From<Arc<FetchError<TransformError>>> for AppError {
    fn from(err: Arc<FetchError<TransformError>>) -> Self {
        match err.as_ref() {
            FetchError::Produce(TransformError::Timeout(after)) => {
                AppError::TransformTimeout(*after)
            }
            FetchError::Produce(TransformError::UnsupportedSource(msg)) => {
                AppError::UnsupportedSource(msg.clone())
            }
            FetchError::Produce(err) => AppError::Transform(err.to_string()),
            FetchError::Cache(err) => AppError::Cache(err.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<axum::http::Error> for AppError {
    fn from(err: axum::http::Error) -> Self {
        AppError::Http(err)
    }
}
