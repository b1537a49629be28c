//! Streaming bodies and the cache tee.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream, StreamExt};

use crate::error::ProxyError;

/// Chunked body as produced by the upstream client.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

/// Callback receiving the complete body once a tee finishes cleanly.
pub type OnComplete = Box<dyn FnOnce(Bytes) + Send>;

pub fn from_bytes(bytes: Bytes) -> BodyStream {
    Box::pin(stream::once(async move { Ok(bytes) }))
}

pub fn empty() -> BodyStream {
    Box::pin(stream::empty())
}

/// Outcome of buffering a body up to a size limit.
pub enum Buffered {
    Complete(Bytes),
    /// The limit was hit; the chunks already read followed by the unread rest.
    Overflow(BodyStream),
}

/// Buffer a body of at most `limit` bytes. Used before rewriting, which
/// needs the full text.
pub async fn collect_limited(mut body: BodyStream, limit: usize) -> Result<Buffered, ProxyError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if buffer.len() + chunk.len() > limit {
            let head = stream::iter([Ok(buffer.freeze()), Ok(chunk)]);
            return Ok(Buffered::Overflow(Box::pin(head.chain(body))));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Buffered::Complete(buffer.freeze()))
}

/// Passes chunks through untouched while keeping a copy of up to `limit`
/// bytes. When the inner stream ends without error and within the limit,
/// the copy is handed to `on_complete`.
pub struct TeeBody {
    inner: BodyStream,
    buffer: Option<BytesMut>,
    limit: usize,
    on_complete: Option<OnComplete>,
}

impl TeeBody {
    pub fn new(inner: BodyStream, limit: usize, on_complete: OnComplete) -> Self {
        Self {
            inner,
            buffer: Some(BytesMut::new()),
            limit,
            on_complete: Some(on_complete),
        }
    }
}

impl Stream for TeeBody {
    type Item = Result<Bytes, ProxyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(buffer) = this.buffer.as_mut() {
                    if buffer.len() + chunk.len() > this.limit {
                        this.buffer = None;
                    } else {
                        buffer.extend_from_slice(&chunk);
                    }
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.buffer = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let (Some(buffer), Some(on_complete)) =
                    (this.buffer.take(), this.on_complete.take())
                {
                    on_complete(buffer.freeze());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
