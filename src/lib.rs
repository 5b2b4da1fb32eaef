//! # dripfeed
//!
//! A synthetic HTTP fixture server for exercising a download client's
//! resume, throttling, and error-handling logic under controlled,
//! reproducible conditions.
//!
//! The core is the `/files/{name}` delivery engine: it serves a fixture
//! file (or a byte sub-range of it) as a stream of 64 KiB chunks, pausing
//! after each chunk so that the complete transfer reproduces a configured
//! target duration. Range requests get correct partial-content semantics,
//! and a range covering part of the file takes the proportional share of
//! the target time, so resumed downloads observe realistic timing.
//!
//! Around the core sit the introspection endpoints a client test harness
//! needs: `/echo`, `/upload`, `/status/{code}`, and `/redirect-to`.
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use dripfeed::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     dripfeed::fixtures::provision(&config).await.unwrap();
//!
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
//!         .await
//!         .unwrap();
//!     let app = dripfeed::app(config)
//!         .into_make_service_with_connect_info::<SocketAddr>();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post};
use axum::Router;
use tokio::io::AsyncSeek;

pub mod config;
pub mod download;
pub mod endpoints;
pub mod fixtures;
pub mod range;
pub mod stream;
pub mod throttle;

pub use download::FileResponse;
pub use range::{resolve, ResolvedRange};
pub use stream::ThrottledStream;
pub use throttle::{DeliveryPlan, CHUNK_SIZE};

use crate::config::ServerConfig;

/// Uploads are counted rather than stored, but the body still has to fit
/// through axum's limit; size it for the largest fixture class.
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
///
/// The delivery engine never seeks relative to its position or the end,
/// and the narrower trait lets anything readable and start-seekable back
/// a session (`tokio::fs::File` in the server, `std::io::Cursor` in
/// tests).
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// Build the full application router over an immutable configuration.
pub fn app(config: Arc<ServerConfig>) -> Router {
    Router::new()
        .route("/", get(endpoints::index))
        .route("/files/{name}", get(download::serve_file))
        .route("/upload", post(endpoints::receive_upload))
        .route("/echo", any(endpoints::echo))
        .route("/status/{code}", get(endpoints::simulate_status))
        .route("/redirect-to", get(endpoints::redirect_to))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(config)
}
