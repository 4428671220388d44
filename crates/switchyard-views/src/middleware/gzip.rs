//! Response compression.

use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_core::Stream;
use pin_project_lite::pin_project;

use switchyard_cache::utils::patch_vary_headers;
use switchyard_core::SwitchyardResult;
use switchyard_http::{HttpRequest, HttpResponse};

use super::{Middleware, MiddlewareHooks, ProcessResponse};

/// Buffered bodies shorter than this aren't worth compressing.
const MIN_COMPRESS_LENGTH: usize = 200;

/// Gzip-compresses `data` in one go.
pub fn compress_string(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(data)?;
    encoder.finish()
}

pin_project! {
    /// Compresses a body stream chunk by chunk.
    ///
    /// Every input chunk is flushed through the encoder so the client can
    /// start decompressing before the stream ends; the gzip trailer is
    /// emitted once the inner stream is exhausted.
    pub struct GzipStream<S> {
        #[pin]
        inner: S,
        encoder: Option<GzEncoder<Vec<u8>>>,
    }
}

impl<S> GzipStream<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            encoder: Some(GzEncoder::new(Vec::new(), Compression::new(6))),
        }
    }
}

impl<S> Stream for GzipStream<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let Some(encoder) = this.encoder.as_mut() else {
            return Poll::Ready(None);
        };
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(chunk)) => {
                if let Err(e) = encoder.write_all(&chunk).and_then(|()| encoder.flush()) {
                    return Poll::Ready(Some(Err(e)));
                }
                let compressed = std::mem::take(encoder.get_mut());
                Poll::Ready(Some(Ok(Bytes::from(compressed))))
            }
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => {
                let finished = this.encoder.take().map(GzEncoder::finish);
                Poll::Ready(finished.map(|tail| tail.map(Bytes::from)))
            }
        }
    }
}

/// Compresses responses for clients that accept gzip.
///
/// Always adds `Accept-Encoding` to `Vary` for bodies large enough to be
/// considered. Buffered bodies are replaced only when compression makes them
/// shorter; streaming bodies are always compressed and lose their
/// `Content-Length`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GZipMiddleware;

impl GZipMiddleware {
    fn client_accepts(request: &HttpRequest, response: &HttpResponse) -> bool {
        // Old IE mishandles compressed non-text content.
        if request.header("user-agent").is_some_and(|ua| ua.contains("MSIE")) {
            let content_type = response.get_header("Content-Type").unwrap_or("").to_ascii_lowercase();
            if !content_type.starts_with("text/") || content_type.contains("javascript") {
                return false;
            }
        }
        request
            .header("accept-encoding")
            .is_some_and(|value| {
                value
                    .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .any(|token| token == "gzip")
            })
    }
}

#[async_trait]
impl ProcessResponse for GZipMiddleware {
    async fn process_response(&self, request: &HttpRequest, mut response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        if !response.is_streaming() && response.content().len() < MIN_COMPRESS_LENGTH {
            return Ok(response);
        }

        patch_vary_headers(&mut response, &["Accept-Encoding"])?;

        if response.has_header("Content-Encoding") || !Self::client_accepts(request, &response) {
            return Ok(response);
        }

        if response.is_streaming() {
            if let Some(stream) = response.take_stream() {
                response.set_stream(Box::pin(GzipStream::new(stream)));
            }
            response.remove_header("Content-Length");
        } else {
            let compressed = compress_string(response.content())?;
            if compressed.len() >= response.content().len() {
                return Ok(response);
            }
            let length = compressed.len();
            response.set_content(compressed);
            response.set_header("Content-Length", length.to_string())?;
        }

        if let Some(etag) = response.get_header("ETag") {
            let tagged = match etag.strip_suffix('"') {
                Some(open) => format!("{open};gzip\""),
                None => etag.to_string(),
            };
            response.set_header("ETag", tagged)?;
        }
        response.set_header("Content-Encoding", "gzip")?;
        Ok(response)
    }
}

impl Middleware for GZipMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new().response(self)
    }
}
