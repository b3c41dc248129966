//!
//! opdsdir HTTP server
//! -------------------
//! Axum front end for the catalog. Every GET, whatever its path, goes through the same handler:
//! resolve the path against the trusted root, then either stream the file or render the
//! directory's feed.
//!
//! Responsibilities:
//! - Trust check on every request (no resolved path is ever reused).
//! - Filesystem work on the blocking pool; the reactor only awaits it.
//! - Feed caching headers (`Last-Modified` / `If-Modified-Since`, or explicit no-cache).
//! - File bodies through `tower_http::services::ServeFile`, which owns range and
//!   conditional semantics for downloads.
//! - One log line per failed request, carrying the path the client asked for.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogBuilder, CatalogFeed, CatalogTarget, FilterPolicy, LocalFs};
use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::ServerConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::paths::TrustedRoot;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Shared, read-only state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub root: Arc<TrustedRoot>,
    pub catalog: Arc<CatalogBuilder>,
    pub filter: FilterPolicy,
    /// Send cache-suppression headers on feeds instead of `Last-Modified`.
    pub no_cache: bool,
}

impl AppState {
    pub fn new(root: TrustedRoot, catalog: CatalogBuilder) -> Self {
        Self { root: Arc::new(root), catalog: Arc::new(catalog), filter: FilterPolicy::default(), no_cache: false }
    }

    pub fn with_filter(mut self, filter: FilterPolicy) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn from_config(cfg: &ServerConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let root = TrustedRoot::new(&cfg.dir)?;
        let catalog = CatalogBuilder::new(Arc::new(LocalFs), clock).with_author(cfg.author());
        Ok(Self::new(root, catalog).with_filter(cfg.filter_policy()).with_no_cache(cfg.no_cache))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_catalog))
        .route("/{*path}", get(serve_catalog))
        .with_state(state)
}

/// Clock for feed timestamps. Cached feeds are stamped with the startup instant so
/// `Last-Modified` stays stable; with caching off, `updated` tracks the wall clock.
pub fn feed_clock(no_cache: bool) -> Arc<dyn Clock> {
    if no_cache {
        Arc::new(SystemClock)
    } else {
        Arc::new(FixedClock::startup())
    }
}

/// Start the catalog server and block until it stops (Ctrl-C shuts it down cleanly).
pub async fn run(cfg: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&cfg, feed_clock(cfg.no_cache))
        .context("While preparing the catalog root")?;
    info!(
        target: "startup",
        "Catalog root {} (hide_dot_files={}, hide_calibre_files={}, no_cache={})",
        state.root.as_path().display(),
        state.filter.hide_dot_files,
        state.filter.hide_calibre_files,
        state.no_cache
    );

    let addr = cfg.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Starting server on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn serve_catalog(State(state): State<AppState>, req: Request) -> Response {
    let raw_path = req.uri().path().to_string();
    match respond(&state, req).await {
        Ok(resp) => resp,
        Err(e) => {
            if e.is_server_error() {
                error!(path = %raw_path, code = e.code_str(), "{}", e);
            } else {
                warn!(path = %raw_path, code = e.code_str(), "{}", e);
            }
            e.into_response()
        }
    }
}

async fn respond(state: &AppState, req: Request) -> CatalogResult<Response> {
    let raw_path = req.uri().path().to_string();
    let blocking = state.clone();
    let target = tokio::task::spawn_blocking(move || {
        let resolved = blocking.root.resolve(&raw_path)?;
        debug!(request_path = %resolved.request_path, fs_path = %resolved.fs_path.display(), "resolved");
        blocking.catalog.lookup(&blocking.root, &resolved, &blocking.filter)
    })
    .await??;

    match target {
        CatalogTarget::File { path, media_type } => serve_file(path, media_type, req).await,
        CatalogTarget::Feed(feed) => feed_response(state, &feed, req.headers()),
    }
}

async fn serve_file(path: PathBuf, media_type: Option<String>, req: Request) -> CatalogResult<Response> {
    let mime = media_type.as_deref().and_then(|t| t.parse::<mime::Mime>().ok());
    let mut service = match &mime {
        Some(m) => ServeFile::new_with_mime(&path, m),
        None => ServeFile::new(&path),
    };
    let resp = service
        .try_call(req)
        .await
        .map_err(|source| CatalogError::StreamFailed { path, source })?;
    Ok(resp.map(Body::new))
}

fn feed_response(state: &AppState, cf: &CatalogFeed, req_headers: &HeaderMap) -> CatalogResult<Response> {
    let updated = cf.feed.updated;
    if !state.no_cache && not_modified_since(req_headers, updated) {
        let mut resp = StatusCode::NOT_MODIFIED.into_response();
        resp.headers_mut().insert(header::LAST_MODIFIED, http_date(updated)?);
        return Ok(resp);
    }

    let mut resp = cf.feed.to_xml()?.into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(cf.content_type()));
    if state.no_cache {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    } else {
        headers.insert(header::LAST_MODIFIED, http_date(updated)?);
    }
    Ok(resp)
}

fn http_date(t: DateTime<Utc>) -> CatalogResult<HeaderValue> {
    HeaderValue::from_str(&t.format(HTTP_DATE).to_string()).map_err(|e| CatalogError::encoding(e.to_string()))
}

/// True when the client's `If-Modified-Since` is at or after `updated`. Unparseable dates never match.
fn not_modified_since(headers: &HeaderMap, updated: DateTime<Utc>) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|since| since.with_timezone(&Utc) >= updated)
        .unwrap_or(false)
}
