//! Repository registry and traversal-safe asset resolution

use crate::error::{ResolveError, Result};
use crate::mime::content_type_for_extension;
use crate::types::{HttpHeaderPolicy, Repository, RepositoryConfig};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A successfully resolved asset inside a repository
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub repository: Arc<Repository>,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lowercase, without the leading dot
    pub extension: String,
    pub content_type: &'static str,
    pub cache_control: String,
}

/// Read-only set of repositories, built once at startup
#[derive(Debug, Clone, Default)]
pub struct RepositoryRegistry {
    repositories: HashMap<String, Arc<Repository>>,
    default_header: HttpHeaderPolicy,
}

impl RepositoryRegistry {
    /// Create an empty registry
    pub fn new(default_header: HttpHeaderPolicy) -> Self {
        Self {
            repositories: HashMap::new(),
            default_header,
        }
    }

    /// Build a registry from configuration, resolving relative roots against `base_dir`
    pub fn from_config(
        configs: &HashMap<String, RepositoryConfig>,
        base_dir: &Path,
        default_header: HttpHeaderPolicy,
    ) -> Self {
        let mut registry = Self::new(default_header);
        for (id, config) in configs {
            registry.insert(id, config.clone(), base_dir);
        }
        registry
    }

    /// Register a repository
    pub fn insert(&mut self, id: &str, config: RepositoryConfig, base_dir: &Path) {
        let root = normalize(&base_dir.join(&config.local_path));
        debug!(repo = %id, root = ?root, "Registered repository");

        self.repositories.insert(
            id.to_string(),
            Arc::new(Repository {
                id: id.to_string(),
                root,
                description: config.description,
                contents: config.contents,
                images: config.images,
            }),
        );
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<Repository>> {
        self.repositories.get(id).cloned()
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<Repository>> {
        self.repositories.values()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// `Cache-Control` value for a content extension in a repository
    pub fn content_cache_control(&self, repository: &Repository, extension: &str) -> String {
        repository
            .content_header(extension)
            .unwrap_or(&self.default_header)
            .header_value()
    }

    /// Resolve `asset_path` inside repository `repo_id`
    ///
    /// The traversal check runs on the lexically normalized path, so encoded
    /// or compound `..` segments cannot escape the repository root.
    pub async fn resolve(&self, repo_id: &str, asset_path: &str) -> Result<ResolvedAsset> {
        let repository = self
            .lookup(repo_id)
            .ok_or_else(|| ResolveError::RepoNotFound(repo_id.to_string()))?;

        let clean = asset_path.strip_prefix('/').unwrap_or(asset_path);
        let resolved = normalize(&repository.root.join(clean));

        let relative = resolved
            .strip_prefix(&repository.root)
            .map_err(|_| ResolveError::AssetPathInvalid)?;
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ResolveError::AssetPathInvalid);
        }

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(ResolveError::AssetNotFound),
            Err(e) => {
                debug!(path = ?resolved, error = %e, "Asset stat failed");
                return Err(ResolveError::AssetNotFound);
            }
        };

        let extension = extension_of(&resolved);
        let cache_control = self.content_cache_control(&repository, &extension);

        Ok(ResolvedAsset {
            content_type: content_type_for_extension(&extension),
            path: resolved,
            size_bytes: metadata.len(),
            extension,
            cache_control,
            repository,
        })
    }
}

/// Lexically normalize a path: drop `.`, apply `..`, keep root and prefix
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Lowercase extension without the dot, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentFileDef;
    use tempfile::tempdir;

    fn registry_for(root: &Path) -> RepositoryRegistry {
        let mut registry = RepositoryRegistry::new(HttpHeaderPolicy::default());
        registry.insert(
            "docs",
            RepositoryConfig {
                local_path: root.to_path_buf(),
                ..Default::default()
            },
            Path::new("/"),
        );
        registry
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/a/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("/a//b/")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/x/IMAGE.PNG")), "png");
        assert_eq!(extension_of(Path::new("/x/archive.tar.gz")), "gz");
        assert_eq!(extension_of(Path::new("/x/README")), "");
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x.png"), b"png").unwrap();
        let registry = registry_for(dir.path());

        let asset = registry.resolve("docs", "x.png").await.unwrap();
        assert_eq!(asset.path, normalize(&dir.path().join("x.png")));
        assert_eq!(asset.size_bytes, 3);
        assert_eq!(asset.extension, "png");
        assert_eq!(asset.content_type, "image/png");
        assert_eq!(asset.cache_control, "public, max-age=86400");
    }

    #[tokio::test]
    async fn test_leading_slash_resolves_to_same_path() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x.png"), b"png").unwrap();
        let registry = registry_for(dir.path());

        let plain = registry.resolve("docs", "x.png").await.unwrap();
        let slashed = registry.resolve("docs", "/x.png").await.unwrap();
        assert_eq!(plain.path, slashed.path);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let registry = registry_for(&dir.path().join("a"));

        for attempt in [
            "../x.png",
            "a/../../etc/passwd",
            "a/b/../../../etc/passwd",
            "//etc/passwd",
            "/../../etc/passwd",
        ] {
            let result = registry.resolve("docs", attempt).await;
            assert!(
                matches!(result, Err(ResolveError::AssetPathInvalid)),
                "{attempt} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_inner_parent_segments_stay_inside_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/a.jpg"), b"jpg").unwrap();
        let registry = registry_for(dir.path());

        let asset = registry.resolve("docs", "img/../img/./a.jpg").await.unwrap();
        assert_eq!(asset.path, normalize(&dir.path().join("img/a.jpg")));
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let registry = RepositoryRegistry::new(HttpHeaderPolicy::default());
        let err = registry.resolve("nope", "x.png").await.unwrap_err();
        assert!(matches!(err, ResolveError::RepoNotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_missing_file_and_directory_are_not_found() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        let registry = registry_for(dir.path());

        assert!(matches!(
            registry.resolve("docs", "missing.png").await,
            Err(ResolveError::AssetNotFound)
        ));
        assert!(matches!(
            registry.resolve("docs", "img").await,
            Err(ResolveError::AssetNotFound)
        ));
        assert!(matches!(
            registry.resolve("docs", "/").await,
            Err(ResolveError::AssetNotFound)
        ));
    }

    #[tokio::test]
    async fn test_per_extension_cache_control_override() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("font.woff2"), b"font").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();

        let mut contents = HashMap::new();
        contents.insert(
            "woff2".to_string(),
            ContentFileDef {
                http_header: Some(HttpHeaderPolicy {
                    control: "public, immutable".to_string(),
                    max_age: 31_536_000,
                }),
            },
        );

        let mut registry = RepositoryRegistry::new(HttpHeaderPolicy {
            control: "no-cache".to_string(),
            max_age: 0,
        });
        registry.insert(
            "fonts",
            RepositoryConfig {
                local_path: dir.path().to_path_buf(),
                contents,
                ..Default::default()
            },
            Path::new("/"),
        );

        let font = registry.resolve("fonts", "font.woff2").await.unwrap();
        assert_eq!(font.cache_control, "public, immutable, max-age=31536000");

        let text = registry.resolve("fonts", "notes.txt").await.unwrap();
        assert_eq!(text.cache_control, "no-cache, max-age=0");
        assert_eq!(text.content_type, "text/plain");
    }

    #[test]
    fn test_relative_root_uses_base_dir() {
        let mut configs = HashMap::new();
        configs.insert(
            "docs".to_string(),
            RepositoryConfig {
                local_path: PathBuf::from("./public/../assets"),
                ..Default::default()
            },
        );

        let registry =
            RepositoryRegistry::from_config(&configs, Path::new("/srv/cdn"), Default::default());
        let repo = registry.lookup("docs").unwrap();
        assert_eq!(repo.root, PathBuf::from("/srv/cdn/assets"));
        assert_eq!(registry.len(), 1);
    }
}
