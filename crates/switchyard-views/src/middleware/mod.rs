//! Middleware framework for switchyard.
//!
//! A middleware is a value exposing some subset of five hooks, each modelled
//! as its own capability trait:
//!
//! - [`ProcessRequest`] runs before resolution and may short-circuit with a response
//! - [`ProcessView`] runs after resolution, before the view, and may short-circuit
//! - [`ProcessTemplateResponse`] runs on responses whose body is still deferred
//! - [`ProcessResponse`] runs on every outgoing response
//! - [`ProcessException`] runs when the view fails, and may turn the failure into a response
//!
//! [`Middleware::hooks`] reports which capabilities a middleware has. The
//! [`MiddlewareRegistry`] keeps one list per hook: request and view hooks run
//! in declared order, the other three in reverse declared order (the "onion"
//! model).
//!
//! Middleware is named in settings by dotted identifiers. A
//! [`MiddlewareLibrary`] maps identifiers to factories; the builtin library
//! knows every middleware in this module.

pub mod cache;
pub mod clickjacking;
pub mod common;
pub mod csrf;
pub mod gzip;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use switchyard_core::{Settings, SwitchyardError, SwitchyardResult};
use switchyard_http::{HttpRequest, HttpResponse, View};

/// Request-stage hook.
#[async_trait]
pub trait ProcessRequest: Send + Sync {
    /// Returns `Some` to answer the request without resolving it.
    async fn process_request(&self, request: &mut HttpRequest) -> SwitchyardResult<Option<HttpResponse>>;
}

/// View-stage hook, called with the resolved view and its arguments.
#[async_trait]
pub trait ProcessView: Send + Sync {
    /// Returns `Some` to answer the request without calling `view`.
    async fn process_view(
        &self,
        request: &mut HttpRequest,
        view: &View,
        args: &[String],
        kwargs: &HashMap<String, String>,
    ) -> SwitchyardResult<Option<HttpResponse>>;
}

/// Hook for responses whose body hasn't been rendered yet.
#[async_trait]
pub trait ProcessTemplateResponse: Send + Sync {
    /// Returns the (possibly replaced) deferred response.
    async fn process_template_response(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> SwitchyardResult<HttpResponse>;
}

/// Response-stage hook.
#[async_trait]
pub trait ProcessResponse: Send + Sync {
    /// Returns the response to hand to the next hook.
    async fn process_response(&self, request: &HttpRequest, response: HttpResponse) -> SwitchyardResult<HttpResponse>;
}

/// Exception-stage hook.
#[async_trait]
pub trait ProcessException: Send + Sync {
    /// Returns `Some` to answer with a response instead of the failure.
    async fn process_exception(
        &self,
        request: &HttpRequest,
        error: &SwitchyardError,
    ) -> SwitchyardResult<Option<HttpResponse>>;
}

/// The hooks a middleware takes part in.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use switchyard_core::SwitchyardResult;
/// use switchyard_http::{HttpRequest, HttpResponse};
/// use switchyard_views::middleware::{Middleware, MiddlewareHooks, ProcessResponse};
///
/// struct PoweredBy;
///
/// #[async_trait]
/// impl ProcessResponse for PoweredBy {
///     async fn process_response(
///         &self,
///         _request: &HttpRequest,
///         mut response: HttpResponse,
///     ) -> SwitchyardResult<HttpResponse> {
///         response.set_header("X-Powered-By", "switchyard")?;
///         Ok(response)
///     }
/// }
///
/// impl Middleware for PoweredBy {
///     fn hooks(self: Arc<Self>) -> MiddlewareHooks {
///         MiddlewareHooks::new().response(self)
///     }
/// }
///
/// let hooks = Arc::new(PoweredBy).hooks();
/// assert!(hooks.response.is_some());
/// assert!(hooks.request.is_none());
/// ```
#[derive(Clone, Default)]
pub struct MiddlewareHooks {
    /// The request hook.
    pub request: Option<Arc<dyn ProcessRequest>>,
    /// The view hook.
    pub view: Option<Arc<dyn ProcessView>>,
    /// The deferred-response hook.
    pub template_response: Option<Arc<dyn ProcessTemplateResponse>>,
    /// The response hook.
    pub response: Option<Arc<dyn ProcessResponse>>,
    /// The exception hook.
    pub exception: Option<Arc<dyn ProcessException>>,
}

impl MiddlewareHooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request hook.
    #[must_use]
    pub fn request(mut self, hook: Arc<dyn ProcessRequest>) -> Self {
        self.request = Some(hook);
        self
    }

    /// Sets the view hook.
    #[must_use]
    pub fn view(mut self, hook: Arc<dyn ProcessView>) -> Self {
        self.view = Some(hook);
        self
    }

    /// Sets the deferred-response hook.
    #[must_use]
    pub fn template_response(mut self, hook: Arc<dyn ProcessTemplateResponse>) -> Self {
        self.template_response = Some(hook);
        self
    }

    /// Sets the response hook.
    #[must_use]
    pub fn response(mut self, hook: Arc<dyn ProcessResponse>) -> Self {
        self.response = Some(hook);
        self
    }

    /// Sets the exception hook.
    #[must_use]
    pub fn exception(mut self, hook: Arc<dyn ProcessException>) -> Self {
        self.exception = Some(hook);
        self
    }

    /// `true` when the middleware takes part in no stage at all.
    pub const fn is_empty(&self) -> bool {
        self.request.is_none()
            && self.view.is_none()
            && self.template_response.is_none()
            && self.response.is_none()
            && self.exception.is_none()
    }
}

impl fmt::Debug for MiddlewareHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareHooks")
            .field("request", &self.request.is_some())
            .field("view", &self.view.is_some())
            .field("template_response", &self.template_response.is_some())
            .field("response", &self.response.is_some())
            .field("exception", &self.exception.is_some())
            .finish()
    }
}

/// A pluggable request/response processing component.
///
/// Implementors also implement the `Process*` traits for the stages they
/// take part in and report them from [`hooks`](Self::hooks).
pub trait Middleware: Send + Sync {
    /// The stages this middleware takes part in.
    fn hooks(self: Arc<Self>) -> MiddlewareHooks;
}

/// The hook lists the pipeline walks, one per stage.
///
/// Request and view hooks are appended, so they run in declared order.
/// Template-response, response and exception hooks are prepended, so they
/// run in reverse declared order.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    pub(crate) request: Vec<Arc<dyn ProcessRequest>>,
    pub(crate) view: Vec<Arc<dyn ProcessView>>,
    pub(crate) template_response: Vec<Arc<dyn ProcessTemplateResponse>>,
    pub(crate) response: Vec<Arc<dyn ProcessResponse>>,
    pub(crate) exception: Vec<Arc<dyn ProcessException>>,
}

impl MiddlewareRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the hooks of the next middleware in declared order.
    pub fn register(&mut self, hooks: MiddlewareHooks) {
        if let Some(hook) = hooks.request {
            self.request.push(hook);
        }
        if let Some(hook) = hooks.view {
            self.view.push(hook);
        }
        if let Some(hook) = hooks.template_response {
            self.template_response.insert(0, hook);
        }
        if let Some(hook) = hooks.response {
            self.response.insert(0, hook);
        }
        if let Some(hook) = hooks.exception {
            self.exception.insert(0, hook);
        }
    }

    /// `(request, view, template_response, response, exception)` hook counts.
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.request.len(),
            self.view.len(),
            self.template_response.len(),
            self.response.len(),
            self.exception.len(),
        )
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("request", &self.request.len())
            .field("view", &self.view.len())
            .field("template_response", &self.template_response.len())
            .field("response", &self.response.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}

/// Builds a middleware instance from settings.
///
/// Returning [`SwitchyardError::MiddlewareNotUsed`] drops the middleware from
/// the pipeline without failing the load.
pub type MiddlewareFactory = Arc<dyn Fn(&Settings) -> SwitchyardResult<Arc<dyn Middleware>> + Send + Sync>;

/// Maps dotted middleware identifiers to factories.
#[derive(Clone, Default)]
pub struct MiddlewareLibrary {
    factories: HashMap<String, MiddlewareFactory>,
}

impl MiddlewareLibrary {
    /// A library with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// A library holding every builtin middleware.
    pub fn builtin() -> Self {
        Self::new()
            .with("switchyard.middleware.cache.UpdateCacheMiddleware", |settings| {
                Ok(Arc::new(cache::UpdateCacheMiddleware::from_settings(settings)?) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.cache.FetchFromCacheMiddleware", |settings| {
                Ok(Arc::new(cache::FetchFromCacheMiddleware::from_settings(settings)?) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.cache.CacheMiddleware", |settings| {
                Ok(Arc::new(cache::CacheMiddleware::from_settings(settings)?) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.common.CommonMiddleware", |settings| {
                Ok(Arc::new(common::CommonMiddleware::from_settings(settings)?) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.gzip.GZipMiddleware", |_settings| {
                Ok(Arc::new(gzip::GZipMiddleware) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.csrf.CsrfViewMiddleware", |settings| {
                Ok(Arc::new(csrf::CsrfViewMiddleware::from_settings(settings)) as Arc<dyn Middleware>)
            })
            .with("switchyard.middleware.clickjacking.XFrameOptionsMiddleware", |settings| {
                Ok(Arc::new(clickjacking::XFrameOptionsMiddleware::from_settings(settings)) as Arc<dyn Middleware>)
            })
    }

    /// Registers `factory` under `path`, replacing any previous entry.
    pub fn register<F>(&mut self, path: &str, factory: F)
    where
        F: Fn(&Settings) -> SwitchyardResult<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.factories.insert(path.to_string(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, path: &str, factory: F) -> Self
    where
        F: Fn(&Settings) -> SwitchyardResult<Arc<dyn Middleware>> + Send + Sync + 'static,
    {
        self.register(path, factory);
        self
    }

    /// Whether `path` names a registered middleware.
    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }

    /// Instantiates the middleware named `path`.
    ///
    /// # Errors
    ///
    /// [`SwitchyardError::ImproperlyConfigured`] when `path` isn't dotted or
    /// names nothing registered; otherwise whatever the factory returns,
    /// including [`SwitchyardError::MiddlewareNotUsed`].
    pub fn load(&self, path: &str, settings: &Settings) -> SwitchyardResult<Arc<dyn Middleware>> {
        let Some((module, class)) = path.rsplit_once('.') else {
            return Err(SwitchyardError::ImproperlyConfigured(format!(
                "{path} isn't a middleware module"
            )));
        };
        if let Some(factory) = self.factories.get(path) {
            return factory(settings);
        }
        let module_prefix = format!("{module}.");
        if self.factories.keys().any(|key| key.starts_with(&module_prefix)) {
            Err(SwitchyardError::ImproperlyConfigured(format!(
                "Middleware module \"{module}\" does not define a \"{class}\" class"
            )))
        } else {
            Err(SwitchyardError::ImproperlyConfigured(format!(
                "Error importing middleware {module}: no module named {module}"
            )))
        }
    }
}

impl fmt::Debug for MiddlewareLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareLibrary").field("factories", &names).finish()
    }
}
