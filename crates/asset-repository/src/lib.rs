//! Asset repositories
//!
//! Maps repository identifiers to local root directories with per-extension
//! cache policy, and resolves caller-supplied relative paths inside those
//! roots without ever escaping them.

pub mod error;
pub mod mime;
pub mod resolver;
pub mod types;

pub use error::{ResolveError, Result};
pub use mime::content_type_for_extension;
pub use resolver::{RepositoryRegistry, ResolvedAsset};
pub use types::{
    CacheStorageConfig, ContentFileDef, HttpHeaderPolicy, ImageFileDef, Repository,
    RepositoryConfig,
};
