//! Handler references.
//!
//! A [`View`] is the terminal handler a URL pattern dispatches to. It wraps an
//! async function from [`HttpRequest`] to [`HttpResponse`] together with a
//! name and a few flags consulted by middleware. Cloning a `View` is cheap and
//! clones share identity, which is what the reverse index uses when looking a
//! pattern up by handler rather than by name.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchyard_core::SwitchyardResult;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// The future returned by a view.
pub type BoxFuture = Pin<Box<dyn Future<Output = SwitchyardResult<HttpResponse>> + Send>>;

/// The type-erased view function.
pub type ViewFn = Arc<dyn Fn(HttpRequest) -> BoxFuture + Send + Sync>;

/// A named, shareable request handler.
///
/// Positional and keyword arguments captured by the resolver are available
/// through [`HttpRequest::resolver_match`].
///
/// # Examples
///
/// ```
/// use switchyard_http::{HttpResponse, View};
///
/// let view = View::new("articles.index", |_req| async { Ok(HttpResponse::ok("index")) });
/// assert_eq!(view.name(), "articles.index");
/// assert!(view.ptr_eq(&view.clone()));
/// ```
#[derive(Clone)]
pub struct View {
    name: Arc<str>,
    func: ViewFn,
    csrf_exempt: bool,
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("csrf_exempt", &self.csrf_exempt)
            .finish_non_exhaustive()
    }
}

impl View {
    /// Wraps an async function as a view.
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SwitchyardResult<HttpResponse>> + Send + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(move |request| Box::pin(f(request))),
            csrf_exempt: false,
        }
    }

    /// Wraps an already type-erased view function.
    pub fn from_fn(name: impl Into<String>, func: ViewFn) -> Self {
        Self {
            name: Arc::from(name.into()),
            func,
            csrf_exempt: false,
        }
    }

    /// Returns the view's dotted name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the view.
    pub fn call(&self, request: HttpRequest) -> BoxFuture {
        (self.func)(request)
    }

    /// Returns `true` when both values wrap the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    /// A stable identity for the wrapped function, used as a map key.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.func).cast::<()>() as usize
    }

    /// Whether CSRF verification is skipped for this view.
    pub const fn is_csrf_exempt(&self) -> bool {
        self.csrf_exempt
    }

    /// Marks the view as exempt from CSRF verification.
    ///
    /// The returned view keeps the identity of `self`.
    #[must_use]
    pub fn with_csrf_exempt(mut self) -> Self {
        self.csrf_exempt = true;
        self
    }

    /// Builds a new view that runs `wrap` around this one.
    ///
    /// The wrapper receives the inner view and the request; the result is a
    /// distinct view (new identity) that keeps the inner view's name and flags.
    #[must_use]
    pub fn wrap<F, Fut>(&self, wrap: F) -> Self
    where
        F: Fn(Self, HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SwitchyardResult<HttpResponse>> + Send + 'static,
    {
        let inner = self.clone();
        Self {
            name: Arc::clone(&self.name),
            func: Arc::new(move |request| Box::pin(wrap(inner.clone(), request))),
            csrf_exempt: self.csrf_exempt,
        }
    }
}
