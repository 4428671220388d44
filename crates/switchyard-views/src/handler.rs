//! The request dispatch pipeline.
//!
//! [`Handler::handle`] takes a request through these stages:
//!
//! 1. Request middleware, in declared order. The first response returned
//!    short-circuits the rest of this list, resolution and the view.
//! 2. Resolution against the root URL configuration, or the request's own
//!    `urlconf` when request middleware set one.
//! 3. View middleware, in declared order, with the same short-circuit rule.
//! 4. The view. If it fails, exception middleware (reverse order) gets a
//!    chance to turn the failure into a response; otherwise it propagates.
//! 5. For a deferred response: template-response middleware (reverse
//!    order), then rendering.
//! 6. Error routing: not-found failures go to the 404 view, permission
//!    failures to the 403 view, anything else to uncaught-failure handling.
//! 7. Response middleware (reverse order) and the response fixes. A failure
//!    here also goes to uncaught-failure handling.
//!
//! Uncaught failures emit `got_request_exception` and are answered by the
//! debug 500 page, the URL configuration's `handler500`, or, when neither
//! applies, returned to the caller as an `Err`.

use std::sync::Arc;

use tracing::Instrument;

use switchyard_core::logging::request_span;
use switchyard_core::{Settings, SwitchyardError, SwitchyardResult};
use switchyard_http::fixes::apply_response_fixes;
use switchyard_http::urls::{get_resolver, set_urlconf, with_url_context, ErrorKind, URLResolver, UrlContext};
use switchyard_http::{HttpRequest, HttpResponse};
use switchyard_signals::{GotRequestException, RequestStarted, SIGNALS};

use crate::debug;
use crate::middleware::{MiddlewareLibrary, MiddlewareRegistry};

/// Runs requests through middleware, resolution and views.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use switchyard_core::Settings;
/// use switchyard_http::urls::{register_urlconf, url, UrlConf};
/// use switchyard_http::{HttpRequest, HttpResponse, View};
/// use switchyard_views::{Handler, MiddlewareLibrary};
///
/// let hello = View::new("hello", |_req| async { Ok(HttpResponse::ok("hello")) });
/// register_urlconf("doc.handler", UrlConf::new(vec![url("^$", hello, None).unwrap()]));
///
/// let mut settings = Settings::default();
/// settings.root_urlconf = "doc.handler".to_string();
/// settings.middleware = Vec::new();
///
/// let mut handler = Handler::new(Arc::new(settings), MiddlewareLibrary::builtin());
/// handler.load_middleware().unwrap();
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let response = rt.block_on(handler.handle(HttpRequest::builder().path("/").build())).unwrap();
/// assert_eq!(response.content(), b"hello");
/// ```
#[derive(Debug)]
pub struct Handler {
    settings: Arc<Settings>,
    library: MiddlewareLibrary,
    middleware: Option<MiddlewareRegistry>,
}

impl Handler {
    /// A handler whose middleware hasn't been loaded yet.
    pub const fn new(settings: Arc<Settings>, library: MiddlewareLibrary) -> Self {
        Self {
            settings,
            library,
            middleware: None,
        }
    }

    /// The settings this handler was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether [`load_middleware`](Self::load_middleware) has succeeded.
    pub const fn is_loaded(&self) -> bool {
        self.middleware.is_some()
    }

    /// The loaded hook lists.
    pub const fn middleware(&self) -> Option<&MiddlewareRegistry> {
        self.middleware.as_ref()
    }

    /// Instantiates every middleware named in settings.
    ///
    /// Entries whose factory reports [`SwitchyardError::MiddlewareNotUsed`]
    /// are skipped. On any other failure the handler stays unloaded.
    ///
    /// # Errors
    ///
    /// [`SwitchyardError::ImproperlyConfigured`] for an unknown identifier or
    /// a middleware exposing no hooks, or whatever a factory returns.
    pub fn load_middleware(&mut self) -> SwitchyardResult<()> {
        self.middleware = None;
        let mut registry = MiddlewareRegistry::new();
        for path in &self.settings.middleware {
            let instance = match self.library.load(path, &self.settings) {
                Ok(instance) => instance,
                Err(SwitchyardError::MiddlewareNotUsed(reason)) => {
                    tracing::debug!(middleware = %path, %reason, "Middleware not used");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let hooks = instance.hooks();
            if hooks.is_empty() {
                return Err(SwitchyardError::ImproperlyConfigured(format!(
                    "Middleware {path} takes part in no processing stage"
                )));
            }
            tracing::debug!(middleware = %path, hooks = ?hooks, "Loaded middleware");
            registry.register(hooks);
        }
        self.middleware = Some(registry);
        Ok(())
    }

    fn root_urlconf(&self) -> Option<String> {
        Some(self.settings.root_urlconf.clone()).filter(|name| !name.is_empty())
    }

    /// Handles one request.
    ///
    /// # Errors
    ///
    /// [`SwitchyardError::ImproperlyConfigured`] before middleware is loaded.
    /// Otherwise only uncaught failures that no 500 view can answer (or that
    /// `debug_propagate_exceptions` asks to propagate) are returned.
    pub async fn handle(&self, mut request: HttpRequest) -> SwitchyardResult<HttpResponse> {
        let Some(middleware) = self.middleware.as_ref() else {
            return Err(SwitchyardError::ImproperlyConfigured(
                "Middleware has not been loaded; call load_middleware() first".to_string(),
            ));
        };

        SIGNALS.request_started.send(&RequestStarted {
            path: request.path().to_string(),
        });

        let span = request_span(request.method().as_str(), request.path());
        let script_prefix = self
            .settings
            .force_script_name
            .clone()
            .unwrap_or_else(|| request.script_name().to_string());
        let root = self.root_urlconf();
        let context = UrlContext::new(&script_prefix).with_urlconf(root.clone());

        with_url_context(
            context,
            async move {
                let mut resolver = get_resolver(root.as_deref())?;

                // The request's urlconf override only lives for this scope.
                let stage = UrlContext::new(&script_prefix).with_urlconf(root.clone());
                let response =
                    with_url_context(stage, self.get_response(middleware, &mut request, &mut resolver)).await?;

                match self.finish_response(middleware, &request, response).await {
                    Ok(response) => Ok(response),
                    Err(error) => self.handle_uncaught_exception(&request, &resolver, error).await,
                }
            }
            .instrument(span),
        )
        .await
    }

    async fn get_response(
        &self,
        middleware: &MiddlewareRegistry,
        request: &mut HttpRequest,
        resolver: &mut Arc<URLResolver>,
    ) -> SwitchyardResult<HttpResponse> {
        match self.dispatch(middleware, request, resolver).await {
            Ok(response) => Ok(response),
            Err(error) if error.is_not_found() => {
                tracing::warn!(path = request.path(), status_code = 404, "Not Found: {}", request.path());
                if self.settings.debug {
                    return Ok(debug::technical_404_response(request, &error));
                }
                match self.call_error_view(resolver, ErrorKind::NotFound, request).await {
                    Ok(response) => Ok(response),
                    Err(error) => self.handle_uncaught_exception(request, resolver, error).await,
                }
            }
            Err(SwitchyardError::PermissionDenied(_)) => {
                tracing::warn!(
                    path = request.path(),
                    status_code = 403,
                    "Forbidden (Permission denied): {}",
                    request.path()
                );
                match self.call_error_view(resolver, ErrorKind::PermissionDenied, request).await {
                    Ok(response) => Ok(response),
                    Err(error) => self.handle_uncaught_exception(request, resolver, error).await,
                }
            }
            Err(error) => self.handle_uncaught_exception(request, resolver, error).await,
        }
    }

    async fn dispatch(
        &self,
        middleware: &MiddlewareRegistry,
        request: &mut HttpRequest,
        resolver: &mut Arc<URLResolver>,
    ) -> SwitchyardResult<HttpResponse> {
        let mut response = None;
        for hook in &middleware.request {
            if let Some(early) = hook.process_request(request).await? {
                response = Some(early);
                break;
            }
        }

        let mut response = match response {
            Some(response) => response,
            None => self.resolve_and_call(middleware, request, resolver).await?,
        };

        if response.is_deferred() {
            for hook in &middleware.template_response {
                response = hook.process_template_response(request, response).await?;
            }
            response.render().await?;
        }
        Ok(response)
    }

    async fn resolve_and_call(
        &self,
        middleware: &MiddlewareRegistry,
        request: &mut HttpRequest,
        resolver: &mut Arc<URLResolver>,
    ) -> SwitchyardResult<HttpResponse> {
        if let Some(urlconf) = request.urlconf().map(str::to_string) {
            set_urlconf(Some(urlconf.clone()));
            *resolver = get_resolver(Some(&urlconf))?;
        }

        let resolver_match = resolver.resolve(request.path_info())?;
        request.set_resolver_match(resolver_match.clone());
        let view = resolver_match.func;

        for hook in &middleware.view {
            if let Some(early) = hook
                .process_view(request, &view, &resolver_match.args, &resolver_match.kwargs)
                .await?
            {
                return Ok(early);
            }
        }

        match view.call(request.clone()).await {
            Ok(response) => Ok(response),
            Err(error) => {
                for hook in &middleware.exception {
                    if let Some(response) = hook.process_exception(request, &error).await? {
                        return Ok(response);
                    }
                }
                Err(error)
            }
        }
    }

    async fn call_error_view(
        &self,
        resolver: &URLResolver,
        kind: ErrorKind,
        request: &HttpRequest,
    ) -> SwitchyardResult<HttpResponse> {
        let view = resolver.resolve_error(kind)?;
        view.call(request.clone()).await
    }

    async fn finish_response(
        &self,
        middleware: &MiddlewareRegistry,
        request: &HttpRequest,
        mut response: HttpResponse,
    ) -> SwitchyardResult<HttpResponse> {
        for hook in &middleware.response {
            response = hook.process_response(request, response).await?;
        }
        apply_response_fixes(request, &mut response)?;
        Ok(response)
    }

    async fn handle_uncaught_exception(
        &self,
        request: &HttpRequest,
        resolver: &URLResolver,
        error: SwitchyardError,
    ) -> SwitchyardResult<HttpResponse> {
        SIGNALS.got_request_exception.send(&GotRequestException {
            path: request.path().to_string(),
            error: error.to_string(),
        });

        if self.settings.debug_propagate_exceptions {
            return Err(error);
        }

        tracing::error!(
            path = request.path(),
            status_code = 500,
            error = %error,
            "Internal Server Error: {}",
            request.path()
        );

        if self.settings.debug {
            return Ok(debug::technical_500_response(request, &error));
        }

        match resolver.custom_error_handler(ErrorKind::ServerError) {
            Ok(Some(view)) => view.call(request.clone()).await,
            Ok(None) => Err(error),
            Err(lookup) => {
                tracing::error!(error = %lookup, "Could not load the 500 view");
                Err(error)
            }
        }
    }
}
