//! HTTP response model.
//!
//! [`HttpResponse`] is the value produced by views and error paths and then
//! mutated in place by middleware. It carries a case-insensitive header map,
//! response cookies, and a body that is either fully buffered or a byte
//! stream. A response may also defer its rendering: it then holds a template
//! name, a JSON context and a [`Renderer`], and only produces bytes when
//! [`HttpResponse::render`] runs.
//!
//! [`HttpResponse::close`] releases registered resources and emits the
//! `request_finished` signal.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::response::IntoResponse;
use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderName, HeaderValue, StatusCode};

use switchyard_core::{SwitchyardError, SwitchyardResult};
use switchyard_signals::{RequestFinished, SIGNALS};

use crate::cookies::{self, Cookie};
use crate::headers::ResponseHeaders;
use crate::utils::iri_to_uri;

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Future returned by a post-render callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = SwitchyardResult<()>> + Send>>;

/// Runs once a deferred response has been rendered.
pub type PostRenderCallback = Box<dyn FnOnce(&HttpResponse) -> CallbackFuture + Send>;

/// The default `Content-Type` of new responses.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const ALLOWED_REDIRECT_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

/// Renders a template into response content.
///
/// The template engine itself is an external collaborator; the pipeline only
/// needs this call.
pub trait Renderer: Send + Sync {
    /// Renders `template_name` with `context`.
    fn render(&self, template_name: &str, context: &serde_json::Value) -> SwitchyardResult<String>;
}

/// The body of a response.
pub enum ResponseContent {
    /// A fully buffered body.
    Bytes(Vec<u8>),
    /// A lazily produced body.
    Streaming(BodyStream),
}

impl fmt::Debug for ResponseContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

struct Deferred {
    template_name: String,
    context: serde_json::Value,
    renderer: Arc<dyn Renderer>,
    rendered: bool,
    callbacks: Vec<PostRenderCallback>,
}

/// An HTTP response.
///
/// # Examples
///
/// ```
/// use switchyard_http::HttpResponse;
///
/// let mut response = HttpResponse::ok("Hello, World!");
/// response.set_header("Cache-Control", "max-age=60").unwrap();
/// assert_eq!(response.status(), http::StatusCode::OK);
/// assert_eq!(response.get_header("cache-control"), Some("max-age=60"));
/// assert_eq!(response.get_header("Content-Type"), Some("text/html; charset=utf-8"));
/// ```
pub struct HttpResponse {
    status: StatusCode,
    headers: ResponseHeaders,
    cookies: BTreeMap<String, Cookie>,
    content: ResponseContent,
    deferred: Option<Deferred>,
    closables: Vec<Box<dyn FnOnce() + Send>>,
    xframe_options_exempt: bool,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("content", &self.content)
            .field(
                "template_name",
                &self.deferred.as_ref().map(|d| d.template_name.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = ResponseHeaders::new();
        let _ = headers.set("Content-Type", DEFAULT_CONTENT_TYPE);
        Self {
            status,
            headers,
            cookies: BTreeMap::new(),
            content: ResponseContent::Bytes(body.into()),
            deferred: None,
            closables: Vec::new(),
            xframe_options_exempt: false,
        }
    }

    /// Creates a response with an explicit content type.
    pub fn with_content_type(
        status: StatusCode,
        body: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> SwitchyardResult<Self> {
        let mut response = Self::new(status, body);
        response.set_header("Content-Type", content_type)?;
        Ok(response)
    }

    /// Creates a response with the given status and body.
    pub fn with_status(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, body)
    }

    /// 200 OK.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// 404 Not Found.
    pub fn not_found(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::NOT_FOUND, body)
    }

    /// 403 Forbidden.
    pub fn forbidden(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::FORBIDDEN, body)
    }

    /// 400 Bad Request.
    pub fn bad_request(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }

    /// 500 Internal Server Error.
    pub fn server_error(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body)
    }

    /// 410 Gone.
    pub fn gone(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::GONE, body)
    }

    /// 304 Not Modified, with no body.
    pub fn not_modified() -> Self {
        let mut response = Self::new(StatusCode::NOT_MODIFIED, Vec::new());
        response.headers.remove("Content-Type");
        response
    }

    /// 405 Method Not Allowed with an `Allow` header.
    pub fn not_allowed(permitted_methods: &[&str]) -> Self {
        let mut response = Self::new(StatusCode::METHOD_NOT_ALLOWED, Vec::new());
        let allow = permitted_methods.join(", ");
        if response.set_header("Allow", allow).is_err() {
            tracing::warn!("Dropping malformed Allow header");
        }
        response
    }

    /// 302 Found.
    ///
    /// Fails with [`SwitchyardError::SuspiciousOperation`] when the target
    /// uses a scheme other than http, https or ftp.
    pub fn redirect(location: &str) -> SwitchyardResult<Self> {
        Self::redirect_with(StatusCode::FOUND, location)
    }

    /// 301 Moved Permanently.
    pub fn permanent_redirect(location: &str) -> SwitchyardResult<Self> {
        Self::redirect_with(StatusCode::MOVED_PERMANENTLY, location)
    }

    fn redirect_with(status: StatusCode, location: &str) -> SwitchyardResult<Self> {
        if let Some((scheme, _)) = location.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if !ALLOWED_REDIRECT_SCHEMES.contains(&scheme.as_str()) {
                return Err(SwitchyardError::SuspiciousOperation(format!(
                    "Unsafe redirect to URL with protocol '{scheme}'"
                )));
            }
        }
        let mut response = Self::new(status, Vec::new());
        response.set_header("Location", iri_to_uri(location))?;
        Ok(response)
    }

    /// A 200 response whose body is produced by `stream`.
    pub fn streaming(stream: BodyStream) -> Self {
        let mut response = Self::new(StatusCode::OK, Vec::new());
        response.content = ResponseContent::Streaming(stream);
        response
    }

    /// A 200 response rendered later from `template_name` and `context`.
    pub fn deferred(
        template_name: impl Into<String>,
        context: serde_json::Value,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let mut response = Self::new(StatusCode::OK, Vec::new());
        response.deferred = Some(Deferred {
            template_name: template_name.into(),
            context,
            renderer,
            rendered: false,
            callbacks: Vec::new(),
        });
        response
    }

    // ── Status ───────────────────────────────────────────────────────

    /// Returns the status code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    // ── Headers ──────────────────────────────────────────────────────

    /// Returns the headers.
    pub const fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    /// Sets a header, rejecting values with newlines.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> SwitchyardResult<()> {
        self.headers.set(name, value)
    }

    /// Returns a header value.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns `true` if the header is set.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Removes a header.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    // ── Cookies ──────────────────────────────────────────────────────

    /// Returns the cookies set on this response.
    pub const fn cookies(&self) -> &BTreeMap<String, Cookie> {
        &self.cookies
    }

    /// Sets a cookie, replacing one with the same name.
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.insert(cookie.name.clone(), cookie);
    }

    /// Sets a cookie whose value is signed with `secret_key`.
    ///
    /// Read it back with [`HttpRequest::get_signed_cookie`](crate::HttpRequest::get_signed_cookie)
    /// using the same salt.
    pub fn set_signed_cookie(&mut self, mut cookie: Cookie, salt: &str, secret_key: &str) {
        let salt = format!("{}{salt}", cookie.name);
        cookie.value = cookies::sign_cookie_value(&cookie.value, secret_key, &salt);
        self.set_cookie(cookie);
    }

    /// Tells the client to drop cookie `name`.
    pub fn delete_cookie(&mut self, name: &str, path: Option<&str>, domain: Option<&str>) {
        let mut cookie = Cookie::expired(name);
        if let Some(path) = path {
            cookie.path = path.to_string();
        }
        cookie.domain = domain.map(str::to_string);
        self.set_cookie(cookie);
    }

    // ── Content ──────────────────────────────────────────────────────

    /// Returns the buffered body; empty for streaming responses.
    pub fn content(&self) -> &[u8] {
        match &self.content {
            ResponseContent::Bytes(b) => b,
            ResponseContent::Streaming(_) => &[],
        }
    }

    /// Replaces the body with buffered bytes.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = ResponseContent::Bytes(content.into());
    }

    /// Returns `true` when the body is a stream.
    pub const fn is_streaming(&self) -> bool {
        matches!(self.content, ResponseContent::Streaming(_))
    }

    /// Replaces the body with a stream.
    pub fn set_stream(&mut self, stream: BodyStream) {
        self.content = ResponseContent::Streaming(stream);
    }

    /// Takes the body stream out, leaving an empty buffered body.
    pub fn take_stream(&mut self) -> Option<BodyStream> {
        match std::mem::replace(&mut self.content, ResponseContent::Bytes(Vec::new())) {
            ResponseContent::Streaming(stream) => Some(stream),
            bytes @ ResponseContent::Bytes(_) => {
                self.content = bytes;
                None
            }
        }
    }

    // ── Deferred rendering ───────────────────────────────────────────

    /// Returns `true` if this response renders lazily and hasn't rendered yet.
    pub fn needs_render(&self) -> bool {
        self.deferred.as_ref().is_some_and(|d| !d.rendered)
    }

    /// Returns `true` if this response declares deferred rendering.
    pub const fn is_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Returns `true` unless the response is waiting to be rendered.
    pub fn is_rendered(&self) -> bool {
        !self.needs_render()
    }

    /// The template a deferred response renders.
    pub fn template_name(&self) -> Option<&str> {
        self.deferred.as_ref().map(|d| d.template_name.as_str())
    }

    /// Replaces the template of a deferred response.
    pub fn set_template_name(&mut self, template_name: impl Into<String>) {
        if let Some(deferred) = self.deferred.as_mut() {
            deferred.template_name = template_name.into();
        }
    }

    /// The context of a deferred response.
    pub fn context_data(&self) -> Option<&serde_json::Value> {
        self.deferred.as_ref().map(|d| &d.context)
    }

    /// Mutable access to the context of a deferred response.
    pub fn context_data_mut(&mut self) -> Option<&mut serde_json::Value> {
        self.deferred.as_mut().map(|d| &mut d.context)
    }

    /// Registers a callback run after rendering.
    ///
    /// If the response is already rendered (or never deferred) the callback
    /// runs immediately.
    pub async fn add_post_render_callback(
        &mut self,
        callback: PostRenderCallback,
    ) -> SwitchyardResult<()> {
        if let Some(deferred) = self.deferred.as_mut().filter(|d| !d.rendered) {
            deferred.callbacks.push(callback);
            return Ok(());
        }
        let fut = callback(&*self);
        fut.await
    }

    /// Renders a deferred response and runs its post-render callbacks.
    ///
    /// Rendering twice is a no-op.
    pub async fn render(&mut self) -> SwitchyardResult<()> {
        let Some(deferred) = self.deferred.as_mut() else {
            return Ok(());
        };
        if deferred.rendered {
            return Ok(());
        }
        let content = deferred
            .renderer
            .render(&deferred.template_name, &deferred.context)?;
        deferred.rendered = true;
        let callbacks = std::mem::take(&mut deferred.callbacks);
        self.content = ResponseContent::Bytes(content.into_bytes());

        for callback in callbacks {
            let fut = callback(&*self);
            fut.await?;
        }
        Ok(())
    }

    // ── Flags ────────────────────────────────────────────────────────

    /// Whether the clickjacking middleware should leave this response alone.
    pub const fn xframe_options_exempt(&self) -> bool {
        self.xframe_options_exempt
    }

    /// Marks the response as exempt from `X-Frame-Options`.
    pub fn set_xframe_options_exempt(&mut self, exempt: bool) {
        self.xframe_options_exempt = exempt;
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Registers a resource released by [`close`](Self::close).
    pub fn add_closable(&mut self, closable: impl FnOnce() + Send + 'static) {
        self.closables.push(Box::new(closable));
    }

    /// Releases registered resources and emits `request_finished`.
    pub fn close(&mut self) {
        for closable in self.closables.drain(..) {
            closable();
        }
        SIGNALS.request_finished.send(&RequestFinished);
    }

    /// Renders the `Set-Cookie` header values.
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.cookies.values().map(Cookie::to_set_cookie_header).collect()
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(mut self) -> axum::response::Response {
        let body = match std::mem::replace(&mut self.content, ResponseContent::Bytes(Vec::new())) {
            ResponseContent::Bytes(bytes) => axum::body::Body::from(bytes),
            ResponseContent::Streaming(stream) => axum::body::Body::from_stream(stream),
        };
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = name, "Dropping header that is not valid HTTP"),
            }
        }
        for cookie in self.set_cookie_headers() {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(http::header::SET_COOKIE, value);
            }
        }
        response
    }
}
