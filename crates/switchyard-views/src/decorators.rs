//! View decorators.
//!
//! Each decorator takes a [`View`] and returns a new one. Wrapping decorators
//! produce a view with its own identity; `csrf_exempt` only flips a flag and
//! keeps the identity of the view it is given.

use std::collections::HashMap;
use std::sync::Arc;

use switchyard_cache::utils::{add_never_cache_headers, patch_vary_headers};
use switchyard_core::{Settings, SwitchyardResult};
use switchyard_http::{HttpRequest, HttpResponse, View};

use crate::middleware::cache::{CacheMiddleware, CacheOptions};
use crate::middleware::{Middleware, MiddlewareHooks};

/// Runs a middleware's hooks around a single view.
///
/// The request and view hooks may short-circuit, the exception hook sees the
/// view's failures, and the response hook sees its response. A deferred
/// response is rendered before the response hook runs.
pub fn decorator_from_middleware(view: &View, middleware: Arc<dyn Middleware>) -> View {
    let hooks = Arc::new(middleware.hooks());
    view.wrap(move |inner, request| {
        let hooks = Arc::clone(&hooks);
        async move { run_with_hooks(&hooks, &inner, request).await }
    })
}

async fn run_with_hooks(hooks: &MiddlewareHooks, view: &View, mut request: HttpRequest) -> SwitchyardResult<HttpResponse> {
    if let Some(hook) = &hooks.request {
        if let Some(response) = hook.process_request(&mut request).await? {
            return Ok(response);
        }
    }
    if let Some(hook) = &hooks.view {
        let (args, kwargs) = request
            .resolver_match()
            .map(|m| (m.args.clone(), m.kwargs.clone()))
            .unwrap_or_else(|| (Vec::new(), HashMap::new()));
        if let Some(response) = hook.process_view(&mut request, view, &args, &kwargs).await? {
            return Ok(response);
        }
    }

    let mut response = match view.call(request.clone()).await {
        Ok(response) => response,
        Err(error) => {
            if let Some(hook) = &hooks.exception {
                if let Some(response) = hook.process_exception(&request, &error).await? {
                    return Ok(response);
                }
            }
            return Err(error);
        }
    };

    if response.is_deferred() {
        if let Some(hook) = &hooks.template_response {
            response = hook.process_template_response(&request, response).await?;
        }
        response.render().await?;
    }
    match &hooks.response {
        Some(hook) => hook.process_response(&request, response).await,
        None => Ok(response),
    }
}

/// Caches the view's responses, as the cache middleware pair would for the
/// whole site.
///
/// # Errors
///
/// Fails when the configured store alias doesn't exist.
///
/// # Examples
///
/// ```
/// use switchyard_core::Settings;
/// use switchyard_http::{HttpResponse, View};
/// use switchyard_views::decorators::cache_page;
/// use switchyard_views::middleware::cache::CacheOptions;
///
/// let view = View::new("news.index", |_req| async { Ok(HttpResponse::ok("news")) });
/// let cached = cache_page(&view, &Settings::default(), CacheOptions::new().timeout(60)).unwrap();
/// assert_eq!(cached.name(), "news.index");
/// assert!(!cached.ptr_eq(&view));
/// ```
pub fn cache_page(view: &View, settings: &Settings, options: CacheOptions) -> SwitchyardResult<View> {
    let middleware = CacheMiddleware::with_options(settings, &options)?;
    Ok(decorator_from_middleware(view, Arc::new(middleware)))
}

/// Marks every response of the view as uncacheable.
pub fn never_cache(view: &View) -> View {
    view.wrap(|inner, request| async move {
        let mut response = inner.call(request).await?;
        add_never_cache_headers(&mut response)?;
        Ok(response)
    })
}

/// Adds `headers` to the `Vary` header of the view's responses.
pub fn vary_on_headers(view: &View, headers: &[&str]) -> View {
    let headers: Arc<[String]> = headers.iter().map(|h| (*h).to_string()).collect();
    view.wrap(move |inner, request| {
        let headers = Arc::clone(&headers);
        async move {
            let mut response = inner.call(request).await?;
            let names: Vec<&str> = headers.iter().map(String::as_str).collect();
            patch_vary_headers(&mut response, &names)?;
            Ok(response)
        }
    })
}

/// Adds `Cookie` to the `Vary` header of the view's responses.
pub fn vary_on_cookie(view: &View) -> View {
    vary_on_headers(view, &["Cookie"])
}

/// Skips CSRF verification for the view.
pub fn csrf_exempt(view: &View) -> View {
    view.clone().with_csrf_exempt()
}

fn with_frame_options(view: &View, value: &'static str) -> View {
    view.wrap(move |inner, request| async move {
        let mut response = inner.call(request).await?;
        if !response.has_header("X-Frame-Options") {
            response.set_header("X-Frame-Options", value)?;
        }
        Ok(response)
    })
}

/// Forbids framing the view's responses.
pub fn xframe_options_deny(view: &View) -> View {
    with_frame_options(view, "DENY")
}

/// Allows framing the view's responses from the same origin only.
pub fn xframe_options_sameorigin(view: &View) -> View {
    with_frame_options(view, "SAMEORIGIN")
}

/// Stops the clickjacking middleware from touching the view's responses.
pub fn xframe_options_exempt(view: &View) -> View {
    view.wrap(|inner, request| async move {
        let mut response = inner.call(request).await?;
        response.set_xframe_options_exempt(true);
        Ok(response)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_core::settings::CacheSettings;

    fn hello() -> View {
        View::new("decorated.hello", |_req| async { Ok(HttpResponse::ok("hello")) })
    }

    fn request() -> HttpRequest {
        HttpRequest::builder().path("/hello/").header("host", "testserver").build()
    }

    #[tokio::test]
    async fn test_vary_on_headers_and_cookie() {
        let view = vary_on_cookie(&vary_on_headers(&hello(), &["Accept-Language"]));
        let response = view.call(request()).await.unwrap();
        assert_eq!(response.get_header("Vary"), Some("Accept-Language, Cookie"));
        assert_eq!(view.name(), "decorated.hello");
    }

    #[test]
    fn test_csrf_exempt_keeps_identity() {
        let view = hello();
        let exempt = csrf_exempt(&view);
        assert!(exempt.is_csrf_exempt());
        assert!(exempt.ptr_eq(&view));
        assert!(xframe_options_deny(&exempt).is_csrf_exempt());
    }

    #[tokio::test]
    async fn test_xframe_decorators() {
        let response = xframe_options_deny(&hello()).call(request()).await.unwrap();
        assert_eq!(response.get_header("X-Frame-Options"), Some("DENY"));
        let response = xframe_options_sameorigin(&hello()).call(request()).await.unwrap();
        assert_eq!(response.get_header("X-Frame-Options"), Some("SAMEORIGIN"));
        let response = xframe_options_exempt(&hello()).call(request()).await.unwrap();
        assert!(response.xframe_options_exempt());
    }

    #[tokio::test]
    async fn test_never_cache() {
        let response = never_cache(&hello()).call(request()).await.unwrap();
        assert_eq!(response.get_header("Cache-Control"), Some("max-age=0"));
        assert!(response.has_header("Expires"));
    }

    #[tokio::test]
    async fn test_cache_page_serves_second_call_from_cache() {
        let mut settings = Settings::default();
        settings.caches.insert(
            "default".to_string(),
            CacheSettings {
                location: "decorators-cache-page".to_string(),
                ..CacheSettings::default()
            },
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let view = View::new("decorated.counted", move |_req| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(HttpResponse::ok(format!("call {n}"))) }
        });
        let cached = cache_page(&view, &settings, CacheOptions::new().timeout(60)).unwrap();

        let first = cached.call(request()).await.unwrap();
        let second = cached.call(request()).await.unwrap();
        assert_eq!(first.content(), b"call 1");
        assert_eq!(second.content(), b"call 1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.get_header("Cache-Control"), Some("max-age=60"));
    }
}
