//! Introspection endpoints for the client under test: echo, multipart
//! upload, status simulation, and redirects. These share the transport
//! with the delivery engine but hold none of its state.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Multipart, Path, Query};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Simulated server-side processing time for uploads.
const UPLOAD_PROCESSING_DELAY: Duration = Duration::from_secs(1);

/// Echo responses jitter between these bounds, in seconds.
const ECHO_JITTER_MIN: f64 = 0.1;
const ECHO_JITTER_MAX: f64 = 0.5;

pub async fn index() -> &'static str {
    "dripfeed fixture server is running"
}

/// Everything the client sent, reflected back as JSON.
#[derive(Debug, Serialize)]
pub struct EchoReply {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub args: HashMap<String, String>,
    pub form: Option<HashMap<String, String>>,
    pub data: Option<String>,
    pub json: Option<serde_json::Value>,
    pub origin: String,
}

pub async fn echo(
    method: Method,
    uri: Uri,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<EchoReply> {
    let jitter = rand::thread_rng().gen_range(ECHO_JITTER_MIN..ECHO_JITTER_MAX);
    tokio::time::sleep(Duration::from_secs_f64(jitter)).await;

    let args = uri
        .query()
        .map(|q| serde_urlencoded::from_str(q).unwrap_or_default())
        .unwrap_or_default();

    let json = content_type_is(&headers, "application/json")
        .then(|| serde_json::from_slice(&body).ok())
        .flatten();
    let form = content_type_is(&headers, "application/x-www-form-urlencoded")
        .then(|| serde_urlencoded::from_bytes(&body).ok())
        .flatten();
    let data = std::str::from_utf8(&body)
        .ok()
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Json(EchoReply {
        method: method.to_string(),
        url: uri.to_string(),
        headers: header_map(&headers),
        args,
        form,
        data,
        json,
        origin: addr.ip().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct UploadReply {
    pub status: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: usize,
    pub form_fields: HashMap<String, String>,
    pub headers_received: BTreeMap<String, String>,
}

/// Receive a multipart upload and report what arrived. The file part is
/// streamed and counted, never stored.
pub async fn receive_upload(headers: HeaderMap, mut multipart: Multipart) -> Response {
    tokio::time::sleep(UPLOAD_PROCESSING_DELAY).await;

    let mut received: Option<(String, Option<String>, usize)> = None;
    let mut form_fields = HashMap::new();

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return upload_error("Malformed multipart body"),
        };
        let field_name = field.name().unwrap_or_default().to_string();

        if field_name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            if filename.is_empty() {
                return upload_error("No selected file");
            }
            let content_type = field.content_type().map(str::to_string);

            let mut size = 0;
            loop {
                match field.chunk().await {
                    Ok(Some(chunk)) => size += chunk.len(),
                    Ok(None) => break,
                    Err(_) => return upload_error("Malformed multipart body"),
                }
            }
            received = Some((filename, content_type, size));
        } else {
            match field.text().await {
                Ok(text) => {
                    form_fields.insert(field_name, text);
                }
                Err(_) => return upload_error("Malformed multipart body"),
            }
        }
    }

    let Some((filename, content_type, size)) = received else {
        return upload_error("No file part");
    };

    debug!(%filename, size, "received upload");

    Json(UploadReply {
        status: "success".to_string(),
        filename,
        content_type,
        size,
        form_fields,
        headers_received: header_map(&headers),
    })
    .into_response()
}

fn upload_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Respond with whatever status the client asked for.
pub async fn simulate_status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("Simulated {code}")).into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            format!("Unsupported status code {code}"),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    pub url: Option<String>,
    pub status: Option<u16>,
}

/// `GET /redirect-to?url=/echo&status=302`
pub async fn redirect_to(Query(params): Query<RedirectParams>) -> Response {
    let status = redirect_status(params.status);
    let target = params.url.unwrap_or_else(|| "/echo".to_string());
    match HeaderValue::from_str(&target) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "Invalid redirect target").into_response(),
    }
}

/// Non-redirection codes fall back to 302 rather than erroring.
fn redirect_status(requested: Option<u16>) -> StatusCode {
    requested
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND)
}

fn content_type_is(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(expected))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
