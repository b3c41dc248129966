//! Request-level error model and its HTTP mapping.
//! Every failure while resolving, listing, encoding or streaming ends the request; nothing
//! is retried. Not-found and out-of-root failures share a status so a client cannot tell them apart.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed request path {path:?}")]
    MalformedPath { path: String },

    #[error("cannot resolve {}: {}", path.display(), source)]
    PathUnresolvable { path: PathBuf, #[source] source: std::io::Error },

    #[error("{} escapes the trusted root", path.display())]
    PathEscapesRoot { path: PathBuf },

    #[error("listing {} failed: {}", path.display(), source)]
    ListingFailed { path: PathBuf, #[source] source: std::io::Error },

    #[error("encoding feed failed: {message}")]
    EncodingFailed { message: String },

    #[error("streaming {} failed: {}", path.display(), source)]
    StreamFailed { path: PathBuf, #[source] source: std::io::Error },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CatalogError {
    pub fn code_str(&self) -> &'static str {
        match self {
            CatalogError::MalformedPath { .. } => "malformed_path",
            CatalogError::PathUnresolvable { .. } => "path_unresolvable",
            CatalogError::PathEscapesRoot { .. } => "path_escapes_root",
            CatalogError::ListingFailed { .. } => "listing_failed",
            CatalogError::EncodingFailed { .. } => "encoding_failed",
            CatalogError::StreamFailed { .. } => "stream_failed",
            CatalogError::Internal { .. } => "internal",
        }
    }

    pub fn encoding<S: Into<String>>(msg: S) -> Self { CatalogError::EncodingFailed { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { CatalogError::Internal { message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        match self {
            CatalogError::PathUnresolvable { .. } | CatalogError::PathEscapesRoot { .. } => StatusCode::NOT_FOUND,
            CatalogError::MalformedPath { .. }
            | CatalogError::ListingFailed { .. }
            | CatalogError::EncodingFailed { .. }
            | CatalogError::StreamFailed { .. }
            | CatalogError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            (status, self.to_string()).into_response()
        } else {
            // No body: a 404 for an escaping path must look like any other 404.
            status.into_response()
        }
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        CatalogError::internal(err.to_string())
    }
}
