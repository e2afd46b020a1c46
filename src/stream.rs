//! HTTP range-request streaming.
//!
//! Serves a resolved file either whole (200) or as one byte span (206),
//! reading in bounded chunks so memory stays independent of file size.
//! Malformed and unsatisfiable ranges get 416 with the advertising
//! `Content-Range: bytes */<size>` header.

use std::io::SeekFrom;
use std::path::{Component, Path};

use axum::{
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::AppError;

const CONTENT_TYPE_VIDEO: &str = "video/mp4";
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Malformed,
    Unsatisfiable,
}

/// Parse a single-span `bytes=<start>-<end>` header against a known file
/// size. The end is optional and defaults to the last byte; an end past
/// the file is clamped. Suffix and multi-range forms are not supported.
pub fn parse_range(header: &str, file_size: u64) -> Result<(u64, u64), RangeError> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or(RangeError::Malformed)?;
    if spec.contains(',') {
        return Err(RangeError::Malformed);
    }

    let (start, end) = spec.split_once('-').ok_or(RangeError::Malformed)?;
    let start: u64 = start.trim().parse().map_err(|_| RangeError::Malformed)?;
    let end: u64 = match end.trim() {
        "" => file_size.saturating_sub(1),
        end => end.parse().map_err(|_| RangeError::Malformed)?,
    };
    let end = end.min(file_size.saturating_sub(1));

    if start >= file_size || start > end {
        return Err(RangeError::Unsatisfiable);
    }
    Ok((start, end))
}

/// Reject relative paths that escape the effective root.
pub fn is_traversal(relative_path: &str) -> bool {
    Path::new(relative_path)
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::RootDir))
}

/// Stream `path` as an HTTP response honouring an optional `Range`
/// header. The file handle is scoped to the response body and released
/// when the stream is dropped, including on client disconnect.
pub async fn stream_file(path: &Path, range: Option<&str>) -> Result<Response, AppError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(_) => return Err(AppError::not_found("Video not found")),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| AppError::internal(format!("failed to read file metadata: {e}")))?;
    let file_size = metadata.len();

    let Some(range) = range else {
        debug!(path = %path.display(), file_size, "streaming full file");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static(CONTENT_TYPE_VIDEO),
        );
        headers.insert(header::CONTENT_LENGTH, header_value(file_size.to_string()));
        headers.insert(header::ACCEPT_RANGES, header::HeaderValue::from_static("bytes"));

        let stream = ReaderStream::with_capacity(file, CHUNK_SIZE);
        return Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response());
    };

    let (start, end) = match parse_range(range, file_size) {
        Ok(span) => span,
        Err(e) => {
            debug!(range, file_size, error = ?e, "rejecting range request");
            return Ok(unsatisfiable_response(file_size));
        }
    };
    let span_len = end - start + 1;

    debug!(path = %path.display(), start, end, file_size, "streaming byte range");

    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| AppError::internal(format!("failed to seek: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static(CONTENT_TYPE_VIDEO),
    );
    headers.insert(
        header::CONTENT_RANGE,
        header_value(format!("bytes {start}-{end}/{file_size}")),
    );
    headers.insert(header::ACCEPT_RANGES, header::HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, header_value(span_len.to_string()));

    let stream = ReaderStream::with_capacity(file.take(span_len), CHUNK_SIZE);
    Ok((
        StatusCode::PARTIAL_CONTENT,
        headers,
        Body::from_stream(stream),
    )
        .into_response())
}

fn unsatisfiable_response(file_size: u64) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_RANGE,
        header_value(format!("bytes */{file_size}")),
    );
    let body = axum::Json(json!({ "message": "Requested range not satisfiable" }));
    (StatusCode::RANGE_NOT_SATISFIABLE, headers, body).into_response()
}

fn header_value(value: String) -> header::HeaderValue {
    // Numeric and `bytes ...` strings are always valid header values.
    header::HeaderValue::from_str(&value)
        .unwrap_or_else(|_| header::HeaderValue::from_static("0"))
}
