//! HTTP server for asset endpoints
//!
//! Provides /health, /api/image/{repo} and /api/content/{repo}.

use crate::analytics::{AnalyticsReporter, Endpoint, RequestData};
use crate::config::{split_comma_list, CorsConfig, ServerConfig};
use crate::error::AppError;
use crate::types::HealthResponse;
use asset_repository::{HttpHeaderPolicy, RepositoryRegistry, ResolvedAsset};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use image_cache_store::{cache_key, ImageCacheStore};
use image_params::{
    validate_content_request, validate_image_request, ContentQuery, ImageQuery, ValidationLimits,
};
use image_transform::{ImageTransformer, TransformError};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

/// Response header telling whether an image came from the cache
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Shared state for the HTTP server
pub struct ServerState {
    pub registry: RepositoryRegistry,
    pub cache: ImageCacheStore,
    pub transformer: Arc<dyn ImageTransformer>,
    pub limits: ValidationLimits,
    pub transform_timeout: Duration,
    pub analytics: Option<AnalyticsReporter>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        registry: RepositoryRegistry,
        cache: ImageCacheStore,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Self {
        Self {
            registry,
            cache,
            transformer,
            limits: ValidationLimits::default(),
            transform_timeout: Duration::from_secs(30),
            analytics: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_transform_timeout(mut self, timeout: Duration) -> Self {
        self.transform_timeout = timeout;
        self
    }

    pub fn with_analytics(mut self, analytics: Option<AnalyticsReporter>) -> Self {
        self.analytics = analytics;
        self
    }

    fn report(
        &self,
        headers: &HeaderMap,
        repository_id: Option<&str>,
        endpoint: Endpoint,
        query: &[(String, String)],
    ) {
        if let Some(reporter) = &self.analytics {
            reporter.report(RequestData::collect(headers, repository_id, endpoint, query));
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/image/{repo}", get(get_image))
        .route("/api/content/{repo}", get(get_content))
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from configuration
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = split_comma_list(&config.methods)
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();

    let mut layer = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_credentials(config.credentials);

    // Credentialed requests cannot use a literal `*`, so mirror instead
    layer = if config.origin.is_wildcard() {
        if config.credentials {
            layer.allow_origin(AllowOrigin::mirror_request())
        } else {
            layer.allow_origin(Any)
        }
    } else {
        let origins: Vec<HeaderValue> = config
            .origin
            .values()
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    };

    let headers = split_comma_list(&config.headers);
    if headers.iter().any(|h| h == "*") {
        if config.credentials {
            layer.allow_headers(AllowHeaders::mirror_request())
        } else {
            layer.allow_headers(Any)
        }
    } else {
        let names: Vec<HeaderName> = headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();
        layer.allow_headers(AllowHeaders::list(names))
    }
}

/// Bind `host:port`, moving up to `search_limit` ports higher while the port is taken
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    search_limit: u16,
) -> std::io::Result<TcpListener> {
    let mut last_err = None;
    for offset in 0..=search_limit {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port = candidate, "Port in use, trying the next one");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(ErrorKind::AddrInUse, format!("No free port from {}", port))
    }))
}

/// Start the HTTP server
pub async fn start_server(
    state: SharedState,
    cors: CorsLayer,
    config: &ServerConfig,
) -> std::io::Result<()> {
    let listener = bind_with_fallback(&config.host, config.port, config.port_search_limit).await?;
    let addr = listener.local_addr()?;
    if addr.port() != config.port {
        warn!(
            "Default port {} was unavailable, using port {} instead",
            config.port,
            addr.port()
        );
    }
    info!("Starting HTTP server on {}", addr);
    info!("Image endpoint: http://{}/api/image/{{repo}}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, create_router(state, cors)).await
}

/// Health check endpoint
async fn health(
    State(state): State<SharedState>,
    Query(raw_query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Json<HealthResponse> {
    state.report(&headers, None, Endpoint::Health, &raw_query);

    state.cache.run_pending_tasks().await;
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Transformed image from a repository, served from the cache when possible
async fn get_image(
    State(state): State<SharedState>,
    Path(repo_id): Path<String>,
    Query(raw_query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = ImageQuery::from_pairs(&raw_query);
    let request = validate_image_request(&repo_id, &query, &state.limits)?;
    state.report(&headers, Some(&request.repo_id), Endpoint::Image, &raw_query);

    let asset = state
        .registry
        .resolve(&request.repo_id, &request.image_path)
        .await?;

    let params = request.params;
    let format = params.format;
    let key = cache_key(
        &source_key(&asset),
        &state.transformer.output_params(&params),
    );

    let transformer = Arc::clone(&state.transformer);
    let timeout = state.transform_timeout;
    let source = asset.path.clone();
    let fetch = state
        .cache
        .get_or_store(&request.repo_id, format, &key, async move {
            let image = tokio::time::timeout(timeout, transformer.transform(&source, &params))
                .await
                .map_err(|_| TransformError::Timeout(timeout))??;
            Ok::<_, TransformError>((image.bytes, image.content_type))
        })
        .await?;

    let cache_control = asset
        .repository
        .image_header(format.as_str())
        .map(HttpHeaderPolicy::header_value)
        .unwrap_or_else(|| asset.cache_control.clone());

    let (body, length, cache_status) = match fetch.produced {
        Some(bytes) => {
            let length = bytes.len() as u64;
            (Body::from(bytes), length, "MISS")
        }
        None => {
            let file = File::open(&fetch.entry.path).await?;
            (
                Body::from_stream(ReaderStream::new(file)),
                fetch.entry.size,
                "HIT",
            )
        }
    };

    asset_response(
        &fetch.entry.content_type,
        &cache_control,
        length,
        Some(cache_status),
        body,
    )
}

/// Raw file from a repository
async fn get_content(
    State(state): State<SharedState>,
    Path(repo_id): Path<String>,
    Query(raw_query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let query = ContentQuery::from_pairs(&raw_query);
    let request = validate_content_request(&repo_id, &query)?;
    state.report(&headers, Some(&request.repo_id), Endpoint::Content, &raw_query);

    let asset = state
        .registry
        .resolve(&request.repo_id, &request.content_path)
        .await?;
    let file = File::open(&asset.path).await?;

    asset_response(
        asset.content_type,
        &asset.cache_control,
        asset.size_bytes,
        None,
        Body::from_stream(ReaderStream::new(file)),
    )
}

/// Path of the asset relative to its repository root, so every spelling of
/// the same file shares one cache key
fn source_key(asset: &ResolvedAsset) -> String {
    asset
        .path
        .strip_prefix(&asset.repository.root)
        .unwrap_or(&asset.path)
        .to_string_lossy()
        .into_owned()
}

fn asset_response(
    content_type: &str,
    cache_control: &str,
    content_length: u64,
    cache_status: Option<&'static str>,
    body: Body,
) -> Result<Response, AppError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::CONTENT_LENGTH, content_length);
    if let Some(cache_status) = cache_status {
        builder = builder.header(CACHE_STATUS_HEADER, cache_status);
    }
    Ok(builder.body(body)?)
}
