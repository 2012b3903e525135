//! Layered configuration: defaults, a YAML file, then `ASSET_CDN_*` variables

use asset_repository::{CacheStorageConfig, HttpHeaderPolicy, RepositoryConfig, RepositoryRegistry};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use image_cache_store::{ImageCacheStore, StoragePolicy};
use image_params::{ImageFormat, ValidationLimits};
use image_transform::TransformSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "ASSET_CDN_";
/// Environment variable naming an explicit config file
pub const CONFIG_PATH_VAR: &str = "ASSET_CDN_CONFIG";
/// Searched in order when no explicit path is given
const CONFIG_FILES: [&str; 2] = ["config.yaml", "config.example.yaml"];

#[derive(Debug)]
pub enum ConfigError {
    Extract(Box<figment::Error>),
    InvalidQuality(u8),
    InvalidPngCompressionLevel(u8),
    InvalidMaxDimension,
    InvalidTransformTimeout,
    EmptyRepositoryPath(String),
    UnsupportedImageFormat { repo: String, format: String },
    MissingAnalyticsCredentials,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Extract(err) => write!(f, "Failed to load configuration: {}", err),
            ConfigError::InvalidQuality(q) => {
                write!(f, "Invalid default_quality: {}. Must be between 1 and 100", q)
            }
            ConfigError::InvalidPngCompressionLevel(level) => write!(
                f,
                "Invalid default_png_compression_level: {}. Must be between 0 and 9",
                level
            ),
            ConfigError::InvalidMaxDimension => {
                write!(f, "max_width and max_height must be at least 1")
            }
            ConfigError::InvalidTransformTimeout => {
                write!(f, "transform_timeout_secs must be at least 1")
            }
            ConfigError::EmptyRepositoryPath(repo) => {
                write!(f, "Repository '{}' has an empty local_path", repo)
            }
            ConfigError::UnsupportedImageFormat { repo, format } => write!(
                f,
                "Repository '{}' configures unsupported image format '{}'",
                repo, format
            ),
            ConfigError::MissingAnalyticsCredentials => write!(
                f,
                "Analytics is enabled but measurement_id or api_secret is empty"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Extract(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub cache: CacheConfig,
    pub image: ImageConfig,
    pub analytics: AnalyticsConfig,
    pub repositories: HashMap<String, RepositoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How many ports after `port` to try when it is taken
    pub port_search_limit: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            port_search_limit: 20,
        }
    }
}

/// `"*"`, a comma separated string, or a list of origins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    One(String),
    Many(Vec<String>),
}

impl CorsOrigin {
    pub fn values(&self) -> Vec<String> {
        match self {
            CorsOrigin::One(value) => split_comma_list(value),
            CorsOrigin::Many(values) => values.iter().map(|v| v.trim().to_string()).collect(),
        }
    }

    /// `*` (or the legacy `true`) allows every origin
    pub fn is_wildcard(&self) -> bool {
        self.values().iter().any(|v| v == "*" || v == "true")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origin: CorsOrigin,
    pub credentials: bool,
    /// Comma separated
    pub methods: String,
    /// Comma separated, `*` for any
    pub headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: CorsOrigin::One("*".to_string()),
            credentials: false,
            methods: "GET,HEAD,OPTIONS".to_string(),
            headers: "Content-Type".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub http_header: HttpHeaderPolicy,
    pub storage: CacheStorageConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./cache/images"),
            http_header: HttpHeaderPolicy::default(),
            storage: CacheStorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub processing: ImageProcessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageProcessingConfig {
    pub default_quality: u8,
    pub default_png_compression_level: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub transform_timeout_secs: u64,
}

impl Default for ImageProcessingConfig {
    fn default() -> Self {
        Self {
            default_quality: 80,
            default_png_compression_level: 6,
            max_width: 4096,
            max_height: 4096,
            transform_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub measurement_id: String,
    pub api_secret: String,
    /// Measurement Protocol collect URL, Google's when unset
    pub endpoint: Option<String>,
}

/// Load configuration from the first config file found and the environment
pub fn load() -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = config_file() {
        figment = figment.merge(Yaml::file(path));
    }
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"));

    from_figment(figment)
}

/// Extract and validate a configuration from an already layered figment
pub fn from_figment(figment: Figment) -> Result<Config, ConfigError> {
    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// `ASSET_CDN_CONFIG` when set, else the first of `config.yaml`, `config.example.yaml`
pub fn config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return Some(PathBuf::from(path));
    }
    CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let processing = &self.image.processing;
        if !(1..=100).contains(&processing.default_quality) {
            return Err(ConfigError::InvalidQuality(processing.default_quality));
        }
        if processing.default_png_compression_level > 9 {
            return Err(ConfigError::InvalidPngCompressionLevel(
                processing.default_png_compression_level,
            ));
        }
        if processing.max_width == 0 || processing.max_height == 0 {
            return Err(ConfigError::InvalidMaxDimension);
        }
        if processing.transform_timeout_secs == 0 {
            return Err(ConfigError::InvalidTransformTimeout);
        }

        for (id, repo) in &self.repositories {
            if repo.local_path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyRepositoryPath(id.clone()));
            }
            // Policies are looked up by the canonical lowercase format name
            if let Some(format) = repo
                .images
                .keys()
                .find(|key| !ImageFormat::ALL.iter().any(|f| f.as_str() == key.as_str()))
            {
                return Err(ConfigError::UnsupportedImageFormat {
                    repo: id.clone(),
                    format: format.clone(),
                });
            }
        }

        if self.analytics.enabled
            && (self.analytics.measurement_id.is_empty() || self.analytics.api_secret.is_empty())
        {
            return Err(ConfigError::MissingAnalyticsCredentials);
        }

        Ok(())
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_width: self.image.processing.max_width,
            max_height: self.image.processing.max_height,
        }
    }

    pub fn transform_settings(&self) -> TransformSettings {
        TransformSettings {
            default_quality: self.image.processing.default_quality,
            default_png_compression_level: self.image.processing.default_png_compression_level,
        }
    }

    pub fn transform_timeout(&self) -> Duration {
        Duration::from_secs(self.image.processing.transform_timeout_secs)
    }

    /// Registry of all configured repositories, relative roots resolved against `base_dir`
    pub fn repository_registry(&self, base_dir: &Path) -> RepositoryRegistry {
        RepositoryRegistry::from_config(
            &self.repositories,
            base_dir,
            self.cache.http_header.clone(),
        )
    }

    /// Image cache with the global storage policy and per-repository overrides
    pub fn image_cache_store(&self, registry: &RepositoryRegistry) -> ImageCacheStore {
        let mut store =
            ImageCacheStore::new(self.cache.directory.clone(), storage_policy(&self.cache.storage));

        for repo in registry.repositories() {
            for format in ImageFormat::ALL {
                if let Some(storage) = repo.image_storage(format.as_str()) {
                    store = store.with_policy(&repo.id, format, storage_policy(storage));
                }
            }
        }
        store
    }
}

fn storage_policy(storage: &CacheStorageConfig) -> StoragePolicy {
    StoragePolicy {
        max_entries: storage.max_size,
        ttl: storage.ttl(),
    }
}

/// Split `"a, b,,c"` into `["a", "b", "c"]`
pub fn split_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
