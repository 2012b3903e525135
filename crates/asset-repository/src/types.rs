//! Repository and cache policy types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// `Cache-Control` header policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaderPolicy {
    pub control: String,
    /// Seconds
    pub max_age: u64,
}

impl HttpHeaderPolicy {
    /// Render as a `Cache-Control` header value
    pub fn header_value(&self) -> String {
        format!("{}, max-age={}", self.control, self.max_age)
    }
}

impl Default for HttpHeaderPolicy {
    fn default() -> Self {
        Self {
            control: "public".to_string(),
            max_age: 86400,
        }
    }
}

/// Sizing of a processed-image cache table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStorageConfig {
    /// Maximum number of entries, `None` means unbounded
    #[serde(default)]
    pub max_size: Option<u64>,
    pub ttl_ms: u64,
}

impl CacheStorageConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheStorageConfig {
    fn default() -> Self {
        Self {
            max_size: Some(1000),
            ttl_ms: 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFileDef {
    #[serde(default)]
    pub http_header: Option<HttpHeaderPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFileDef {
    #[serde(default)]
    pub http_header: Option<HttpHeaderPolicy>,
    #[serde(default)]
    pub storage: Option<CacheStorageConfig>,
}

/// A repository as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub local_path: PathBuf,
    #[serde(default)]
    pub description: String,
    /// Keyed by lowercase extension without the dot
    #[serde(default)]
    pub contents: HashMap<String, ContentFileDef>,
    /// Keyed by output image format
    #[serde(default)]
    pub images: HashMap<String, ImageFileDef>,
}

/// A loaded repository with an absolute root directory
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: String,
    pub root: PathBuf,
    pub description: String,
    pub contents: HashMap<String, ContentFileDef>,
    pub images: HashMap<String, ImageFileDef>,
}

impl Repository {
    /// Header policy configured for a content extension
    pub fn content_header(&self, extension: &str) -> Option<&HttpHeaderPolicy> {
        self.contents
            .get(extension)
            .and_then(|def| def.http_header.as_ref())
    }

    /// Header policy configured for an output image format
    pub fn image_header(&self, format: &str) -> Option<&HttpHeaderPolicy> {
        self.images
            .get(format)
            .and_then(|def| def.http_header.as_ref())
    }

    /// Storage policy configured for an output image format
    pub fn image_storage(&self, format: &str) -> Option<&CacheStorageConfig> {
        self.images.get(format).and_then(|def| def.storage.as_ref())
    }
}
