use std::future::Future;
use std::time::Duration;
use std::{io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{sleep, Sleep};

use crate::throttle::DeliveryPlan;
use crate::AsyncSeekStart;

/// Throttled response body stream. Implements [`Stream`], [`Body`], and
/// [`IntoResponse`].
///
/// Chunks are produced lazily in strictly increasing offset order, each at
/// most `chunk_size` bytes, so peak memory per session is one chunk. After
/// every emitted chunk (including the last) the stream suspends for the
/// plan's per-chunk delay; the pause is a per-task timer, so concurrent
/// sessions pace independently. Dropping the stream cancels any pending
/// delay and releases the underlying reader, which is how a client
/// disconnect tears a session down.
#[pin_project]
pub struct ThrottledStream<B> {
    state: StreamState,
    remaining: u64,
    chunk_size: usize,
    delay: Duration,
    #[pin]
    body: B,
}

impl<B: AsyncRead + AsyncSeekStart> ThrottledStream<B> {
    pub fn new(body: B, plan: DeliveryPlan) -> Self {
        ThrottledStream {
            state: StreamState::Seek { start: plan.start },
            remaining: plan.bytes,
            chunk_size: plan.chunk_size,
            delay: plan.delay_per_chunk,
            body,
        }
    }
}

enum StreamState {
    Seek { start: u64 },
    Seeking,
    Reading { buffer: BytesMut },
    Sleeping { sleep: Pin<Box<Sleep>> },
}

impl<B: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for ThrottledStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: AsyncRead + AsyncSeekStart> Body for ThrottledStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: AsyncRead + AsyncSeekStart> Stream for ThrottledStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                StreamState::Seek { start } => {
                    match this.body.as_mut().start_seek(*start) {
                        Err(e) => return Poll::Ready(Some(Err(e))),
                        Ok(()) => {
                            *this.state = StreamState::Seeking;
                        }
                    }
                }

                StreamState::Seeking => {
                    match this.body.as_mut().poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                        Poll::Ready(Ok(())) => {
                            let buffer = BytesMut::with_capacity(*this.chunk_size);
                            *this.state = StreamState::Reading { buffer };
                        }
                    }
                }

                StreamState::Sleeping { sleep } => {
                    match sleep.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(()) => {
                            let buffer = BytesMut::with_capacity(*this.chunk_size);
                            *this.state = StreamState::Reading { buffer };
                        }
                    }
                }

                StreamState::Reading { buffer } => {
                    if *this.remaining == 0 {
                        return Poll::Ready(None);
                    }

                    let uninit = buffer.spare_capacity_mut();

                    // read at most one chunk, and never past the planned
                    // byte count
                    let nbytes = std::cmp::min(
                        uninit.len(),
                        usize::try_from(*this.remaining).unwrap_or(usize::MAX),
                    );

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    match this.body.as_mut().poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                        Poll::Ready(Ok(())) => match read_buf.filled().len() {
                            // backing resource ended before the plan did
                            0 => return Poll::Ready(None),
                            n => {
                                // SAFETY: poll_read has filled the buffer
                                // with `n` additional bytes. `buffer.len`
                                // should always be 0 here, but include it
                                // for rigorous correctness
                                unsafe { buffer.set_len(buffer.len() + n); }

                                // this usize->u64 conversion always
                                // succeeds, n cannot exceed remaining due
                                // to the cmp::min above
                                *this.remaining -= u64::try_from(n).unwrap_or(0);

                                let next = if this.delay.is_zero() {
                                    BytesMut::with_capacity(*this.chunk_size)
                                } else {
                                    BytesMut::new()
                                };
                                let chunk = mem::replace(buffer, next);

                                if !this.delay.is_zero() {
                                    let timer = Box::pin(sleep(*this.delay));
                                    *this.state = StreamState::Sleeping { sleep: timer };
                                }

                                return Poll::Ready(Some(Ok(chunk.freeze())));
                            }
                        },
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::Bytes;
    use futures::{pin_mut, Stream, StreamExt};
    use tokio::time::Instant;

    use crate::range::resolve;
    use crate::throttle::DeliveryPlan;

    use super::ThrottledStream;

    const DATA: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    fn stream_for(spec: Option<&str>, target: Duration, chunk_size: usize)
        -> ThrottledStream<Cursor<&'static [u8]>>
    {
        let total = DATA.len() as u64;
        let range = resolve(total, spec);
        let plan = DeliveryPlan::with_chunk_size(range, total, target, chunk_size);
        ThrottledStream::new(Cursor::new(DATA), plan)
    }

    async fn collect_stream(stream: impl Stream<Item = std::io::Result<Bytes>>) -> Vec<u8> {
        let mut out = Vec::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_full_stream_matches_source() {
        let body = collect_stream(stream_for(None, Duration::ZERO, 4)).await;
        assert_eq!(DATA, &body[..]);
    }

    #[tokio::test]
    async fn test_chunks_bounded_and_in_order() {
        let stream = stream_for(None, Duration::ZERO, 4);
        pin_mut!(stream);
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            assert!(chunk.len() <= 4);
            body.extend_from_slice(&chunk);
        }
        // in-order, no skips: concatenation reproduces the source exactly
        assert_eq!(DATA, &body[..]);
    }

    #[tokio::test]
    async fn test_seeks_to_range_start() {
        let body = collect_stream(stream_for(Some("bytes=10-19"), Duration::ZERO, 4)).await;
        assert_eq!(&DATA[10..20], &body[..]);
    }

    #[tokio::test]
    async fn test_plan_longer_than_source_ends_at_eof() {
        let range = resolve(100, Some("bytes=30-99"));
        let plan = DeliveryPlan::with_chunk_size(range, 100, Duration::ZERO, 8);
        let body = collect_stream(ThrottledStream::new(Cursor::new(DATA), plan)).await;
        assert_eq!(&DATA[30..], &body[..]);
    }

    #[tokio::test]
    async fn test_empty_plan_yields_nothing() {
        let range = resolve(0, None);
        let plan = DeliveryPlan::with_chunk_size(range, 0, Duration::from_secs(5), 4);
        let body = collect_stream(ThrottledStream::new(Cursor::new(&b""[..]), plan)).await;
        assert!(body.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_every_chunk() {
        // 36 bytes in 12-byte chunks is 3 chunks; a 3s target is 1s each.
        let started = Instant::now();
        let body = collect_stream(stream_for(None, Duration::from_secs(3), 12)).await;
        assert_eq!(DATA, &body[..]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_range_paces_proportionally() {
        // 36 bytes in 6-byte chunks is 6 chunks, so a 3s target paces at
        // 0.5s per chunk; the 18-byte tail walks 3 of them.
        let started = Instant::now();
        let body = collect_stream(stream_for(Some("bytes=18-"), Duration::from_secs(3), 6)).await;
        assert_eq!(&DATA[18..], &body[..]);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_mid_stream_cancels_schedule() {
        let stream = stream_for(None, Duration::from_secs(60), 4);
        pin_mut!(stream);
        let first = stream.next().await.transpose().unwrap();
        assert_eq!(Some(Bytes::from_static(&DATA[..4])), first);
        // dropping with a delay pending must not hang or leak the timer
    }
}
