//! Static file responses.
//!
//! # Responsibilities
//! - Turn a [`Resolution`] into a response
//! - Stream file contents with the configured content type
//!
//! # Design Decisions
//! - Status and headers are fixed before the first body byte
//! - Files are streamed in chunks; nothing is read into memory up front
//! - Read failures after headers are sent end the body early

use std::path::Path;

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use crate::config::MimeTable;
use crate::http::response::error_response;
use crate::routing::{Resolution, StaticResolver};

/// Resolve `path` against the served directory and build the response.
pub async fn serve(resolver: &StaticResolver, mime_types: &MimeTable, path: &str) -> Response {
    match resolver.resolve(path).await {
        Resolution::Redirect(location) => redirect(&location),
        Resolution::File(file) => stream_file(&file, &mime_types.content_type(&file)).await,
        Resolution::NotFound => {
            tracing::debug!(path = %path, "No static file");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!(location = %location, "Redirect target is not a valid header value");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target")
        }
    }
}

async fn stream_file(path: &Path, content_type: &str) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to open static file");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    match builder.body(Body::from_stream(ReaderStream::new(file))) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to build static response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
