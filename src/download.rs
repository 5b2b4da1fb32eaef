//! The `/files/{name}` delivery endpoint: range resolution, header
//! construction, and the throttled streaming response.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange};
use axum_extra::TypedHeader;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tracing::{debug, error};

use crate::config::ServerConfig;
use crate::range::{resolve, ResolvedRange};
use crate::stream::ThrottledStream;
use crate::throttle::DeliveryPlan;
use crate::AsyncSeekStart;

/// Serve a fixture, optionally throttled and optionally as a sub-range.
///
/// Unknown names are 404; a fixture that exists but cannot be opened or
/// sized is 500 (no bytes have been sent yet at that point). Once
/// streaming starts, failures terminate the connection mid-body, which is
/// exactly the truncated-transfer shape download clients are tested
/// against.
pub async fn serve_file(
    State(config): State<Arc<ServerConfig>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_valid_name(&name) {
        return not_found();
    }

    let file = match File::open(config.file_path(&name)).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(e) => {
            error!(%name, error = %e, "failed to open fixture");
            return unreadable();
        }
    };

    let total_len = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => {
            error!(%name, error = %e, "failed to stat fixture");
            return unreadable();
        }
    };

    let specifier = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let range = resolve(total_len, specifier);
    let plan = DeliveryPlan::new(range, total_len, config.throttle_target(&name));

    debug!(
        %name,
        start = range.start,
        bytes = range.len(),
        partial = range.is_partial,
        delay_us = plan.delay_per_chunk.as_micros() as u64,
        "serving fixture"
    );

    let stream = ThrottledStream::new(file, plan);
    FileResponse::new(name, range, total_len, stream).into_response()
}

/// Fixture names are flat: no separators, no traversal, nothing a header
/// value can choke on.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

fn unreadable() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
}

/// Computed status and header set for a delivery response. Implements
/// [`IntoResponse`].
pub enum FileResponse<B> {
    /// Whole resource, plain 200.
    Full {
        name: String,
        content_length: ContentLength,
        stream: ThrottledStream<B>,
    },
    /// Sub-range, 206 with `Content-Range`.
    Partial {
        name: String,
        content_range: ContentRange,
        content_length: ContentLength,
        stream: ThrottledStream<B>,
    },
}

impl<B> FileResponse<B> {
    pub fn new(
        name: String,
        range: ResolvedRange,
        total_len: u64,
        stream: ThrottledStream<B>,
    ) -> Self {
        if range.is_partial {
            let content_range = ContentRange::bytes(range.start..range.end_exclusive, total_len)
                .expect("resolver output is always a satisfiable range");
            FileResponse::Partial {
                name,
                content_range,
                content_length: ContentLength(range.len()),
                stream,
            }
        } else {
            FileResponse::Full {
                name,
                content_length: ContentLength(total_len),
                stream,
            }
        }
    }
}

impl<B: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for FileResponse<B> {
    fn into_response(self) -> Response {
        match self {
            FileResponse::Full { name, content_length, stream } => (
                StatusCode::OK,
                TypedHeader(AcceptRanges::bytes()),
                TypedHeader(content_length),
                attachment_headers(&name),
                stream,
            )
                .into_response(),
            FileResponse::Partial { name, content_range, content_length, stream } => (
                StatusCode::PARTIAL_CONTENT,
                TypedHeader(content_range),
                TypedHeader(AcceptRanges::bytes()),
                TypedHeader(content_length),
                attachment_headers(&name),
                stream,
            )
                .into_response(),
        }
    }
}

fn attachment_headers(name: &str) -> [(HeaderName, HeaderValue); 2] {
    [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename={name}"))
                .expect("fixture names contain only header-safe characters"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use axum::http::{HeaderValue, StatusCode};
    use axum::response::{IntoResponse, Response};
    use bytes::Bytes;
    use futures::{pin_mut, Stream, StreamExt};

    use crate::range::resolve;
    use crate::stream::ThrottledStream;
    use crate::throttle::DeliveryPlan;

    use super::{is_valid_name, FileResponse};

    const DATA: &[u8] = b"Hello world this is a file to test range requests on!\n";

    fn response_for(specifier: Option<&str>) -> Response {
        let total = DATA.len() as u64;
        let range = resolve(total, specifier);
        let plan = DeliveryPlan::with_chunk_size(range, total, Duration::ZERO, 16);
        let stream = ThrottledStream::new(Cursor::new(DATA), plan);
        FileResponse::new("fixture.txt".to_string(), range, total, stream).into_response()
    }

    async fn collect_body_stream(body: impl Stream<Item = Result<Bytes, axum::Error>>) -> Vec<u8> {
        let mut out = Vec::new();
        pin_mut!(body);
        while let Some(chunk) = body.next().await.transpose().unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_full_response() {
        let response = response_for(None);
        assert_eq!(StatusCode::OK, response.status());

        let head = response.headers();
        assert_eq!(Some(HeaderValue::from_static("bytes")).as_ref(), head.get("Accept-Ranges"));
        assert_eq!(Some(HeaderValue::from_static("54")).as_ref(), head.get("Content-Length"));
        assert_eq!(
            Some(HeaderValue::from_static("application/octet-stream")).as_ref(),
            head.get("Content-Type"),
        );
        assert_eq!(
            Some(HeaderValue::from_static("attachment; filename=fixture.txt")).as_ref(),
            head.get("Content-Disposition"),
        );
        assert!(head.get("Content-Range").is_none());

        let body = collect_body_stream(response.into_body().into_data_stream()).await;
        assert_eq!(DATA, &body[..]);
    }

    #[tokio::test]
    async fn test_partial_response() {
        let response = response_for(Some("bytes=6-10"));
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());

        let head = response.headers();
        assert_eq!(
            Some(HeaderValue::from_static("bytes 6-10/54")).as_ref(),
            head.get("Content-Range"),
        );
        assert_eq!(Some(HeaderValue::from_static("5")).as_ref(), head.get("Content-Length"));
        assert_eq!(Some(HeaderValue::from_static("bytes")).as_ref(), head.get("Accept-Ranges"));

        let body = collect_body_stream(response.into_body().into_data_stream()).await;
        assert_eq!(&DATA[6..11], &body[..]);
    }

    #[tokio::test]
    async fn test_malformed_range_serves_full() {
        let response = response_for(Some("bytes=garbage"));
        assert_eq!(StatusCode::OK, response.status());
        assert!(response.headers().get("Content-Range").is_none());

        let body = collect_body_stream(response.into_body().into_data_stream()).await;
        assert_eq!(DATA, &body[..]);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("10MB.zip"));
        assert!(is_valid_name("fixture_v2-final.bin"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("../../etc/passwd"));
        assert!(!is_valid_name("a/b.bin"));
        assert!(!is_valid_name("name with spaces"));
    }
}
