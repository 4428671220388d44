//! Cross-site request forgery protection.
//!
//! Every request gets a token: the one in the CSRF cookie when it is well
//! formed, or a fresh random one. Requests with an unsafe method must echo
//! the cookie's token back, either in the `csrfmiddlewaretoken` form field
//! or in the `X-CSRFToken` header. Over HTTPS the `Referer` must also be
//! same-origin.
//!
//! The cookie is only (re)set on the way out when something asked for the
//! token through [`get_token`] while handling the request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;

use switchyard_cache::utils::patch_vary_headers;
use switchyard_core::{Settings, SwitchyardResult};
use switchyard_http::utils::escape_html;
use switchyard_http::{Cookie, HttpRequest, HttpResponse, View};

use super::{Middleware, MiddlewareHooks, ProcessResponse, ProcessView};

const CSRF_KEY_LENGTH: usize = 32;
const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";
const CSRF_HEADER: &str = "x-csrftoken";

/// No `Referer` on a secure request.
pub const REASON_NO_REFERER: &str = "Referer checking failed - no Referer.";
/// No CSRF cookie on an unsafe request.
pub const REASON_NO_CSRF_COOKIE: &str = "CSRF cookie not set.";
/// The submitted token doesn't match the cookie.
pub const REASON_BAD_TOKEN: &str = "CSRF token missing or incorrect.";

/// The token for the current request, shared by every clone of it.
#[derive(Debug)]
pub struct CsrfToken {
    value: String,
    used: AtomicBool,
}

impl CsrfToken {
    fn new(value: String) -> Self {
        Self {
            value,
            used: AtomicBool::new(false),
        }
    }

    /// Whether something read the token while handling the request.
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }
}

/// Marks a request the CSRF check has already accepted.
#[derive(Debug, Clone, Copy)]
struct CsrfChecked;

/// The token for `request`, marking it as used so the response sets the
/// cookie. `None` when the CSRF middleware hasn't seen the request.
pub fn get_token(request: &HttpRequest) -> Option<String> {
    request.extensions().get::<Arc<CsrfToken>>().map(|token| {
        token.used.store(true, Ordering::SeqCst);
        token.value.clone()
    })
}

fn new_csrf_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_KEY_LENGTH)
        .map(char::from)
        .collect()
}

fn sanitize_token(token: &str) -> String {
    if token.len() > CSRF_KEY_LENGTH {
        return new_csrf_key();
    }
    let cleaned: String = token.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() {
        new_csrf_key()
    } else {
        cleaned
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

fn same_origin(first: &str, second: &str) -> bool {
    match (Url::parse(first), Url::parse(second)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

const fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

/// The response for a rejected request.
pub fn csrf_failure(reason: &str) -> HttpResponse {
    HttpResponse::forbidden(format!(
        "<h1>Forbidden <span>(403)</span></h1>\
         <p>CSRF verification failed. Request aborted.</p>\
         <p>Reason given for failure:</p><pre>{}</pre>",
        escape_html(reason)
    ))
}

/// Verifies tokens on unsafe requests and maintains the CSRF cookie.
#[derive(Debug, Clone)]
pub struct CsrfViewMiddleware {
    cookie_name: String,
    cookie_age: u64,
    cookie_domain: Option<String>,
    cookie_path: String,
    cookie_secure: bool,
    cookie_httponly: bool,
}

impl CsrfViewMiddleware {
    /// Builds the middleware from the `csrf_cookie_*` settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cookie_name: settings.csrf_cookie_name.clone(),
            cookie_age: settings.csrf_cookie_age,
            cookie_domain: settings.csrf_cookie_domain.clone(),
            cookie_path: settings.csrf_cookie_path.clone(),
            cookie_secure: settings.csrf_cookie_secure,
            cookie_httponly: settings.csrf_cookie_httponly,
        }
    }

    fn accept(request: &mut HttpRequest) -> Option<HttpResponse> {
        request.extensions_mut().insert(CsrfChecked);
        None
    }

    fn reject(request: &HttpRequest, reason: &str) -> Option<HttpResponse> {
        tracing::warn!(path = request.path(), status_code = 403, "Forbidden ({}): {}", reason, request.path());
        Some(csrf_failure(reason))
    }

    fn check(request: &mut HttpRequest, cookie_token: Option<&str>) -> Option<HttpResponse> {
        if request.is_secure() {
            let Some(referer) = request.header("referer") else {
                return Self::reject(request, REASON_NO_REFERER);
            };
            let good_referer = format!("https://{}/", request.get_host());
            if !same_origin(referer, &good_referer) {
                let reason = format!("Referer checking failed - {referer} does not match {good_referer}.");
                return Self::reject(request, &reason);
            }
        }

        let Some(cookie_token) = cookie_token else {
            return Self::reject(request, REASON_NO_CSRF_COOKIE);
        };

        let mut request_token = String::new();
        if request.method() == Method::POST {
            request_token = request.post_param(CSRF_FORM_FIELD).unwrap_or_default();
        }
        if request_token.is_empty() {
            request_token = request.header(CSRF_HEADER).unwrap_or_default().to_string();
        }
        if !constant_time_eq(request_token.as_bytes(), cookie_token.as_bytes()) {
            return Self::reject(request, REASON_BAD_TOKEN);
        }
        Self::accept(request)
    }
}

#[async_trait]
impl ProcessView for CsrfViewMiddleware {
    async fn process_view(
        &self,
        request: &mut HttpRequest,
        view: &View,
        _args: &[String],
        _kwargs: &HashMap<String, String>,
    ) -> SwitchyardResult<Option<HttpResponse>> {
        if request.extensions().get::<CsrfChecked>().is_some() {
            return Ok(None);
        }

        let cookie_token = request.cookie(&self.cookie_name).map(sanitize_token);
        let token = cookie_token.clone().unwrap_or_else(new_csrf_key);
        request.extensions_mut().insert(Arc::new(CsrfToken::new(token)));

        if view.is_csrf_exempt() {
            return Ok(None);
        }
        if is_safe_method(request.method()) {
            return Ok(Self::accept(request));
        }
        Ok(Self::check(request, cookie_token.as_deref()))
    }
}

#[async_trait]
impl ProcessResponse for CsrfViewMiddleware {
    async fn process_response(&self, request: &HttpRequest, mut response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        let Some(token) = request.extensions().get::<Arc<CsrfToken>>() else {
            return Ok(response);
        };
        if !token.is_used() {
            return Ok(response);
        }
        let mut cookie = Cookie::new(self.cookie_name.clone(), token.value.clone())
            .max_age(self.cookie_age)
            .path(self.cookie_path.clone());
        if let Some(domain) = &self.cookie_domain {
            cookie = cookie.domain(domain.clone());
        }
        cookie.secure = self.cookie_secure;
        cookie.httponly = self.cookie_httponly;
        response.set_cookie(cookie);
        patch_vary_headers(&mut response, &["Cookie"])?;
        Ok(response)
    }
}

impl Middleware for CsrfViewMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new()
            .view(Arc::clone(&self) as Arc<dyn ProcessView>)
            .response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn middleware() -> CsrfViewMiddleware {
        CsrfViewMiddleware::from_settings(&Settings::default())
    }

    fn view() -> View {
        View::new("csrf.form", |_req| async { Ok(HttpResponse::ok("ok")) })
    }

    async fn run_view(request: &mut HttpRequest, view: &View) -> Option<HttpResponse> {
        middleware()
            .process_view(request, view, &[], &HashMap::new())
            .await
            .unwrap()
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(sanitize_token("abc-123"), "abc123");
        assert_eq!(sanitize_token("!!!").len(), CSRF_KEY_LENGTH);
        assert_eq!(sanitize_token(&"a".repeat(40)).len(), CSRF_KEY_LENGTH);
        assert_ne!(sanitize_token(&"a".repeat(40)), "a".repeat(CSRF_KEY_LENGTH));
    }

    #[test]
    fn test_same_origin() {
        assert!(same_origin("https://example.com/form/", "https://example.com/"));
        assert!(!same_origin("https://evil.com/", "https://example.com/"));
        assert!(!same_origin("http://example.com/", "https://example.com/"));
        assert!(!same_origin("not a url", "https://example.com/"));
    }

    #[tokio::test]
    async fn test_safe_method_passes_and_cookie_set_when_used() {
        let mut request = HttpRequest::builder().path("/").build();
        assert!(run_view(&mut request, &view()).await.is_none());

        let untouched = middleware()
            .process_response(&request, HttpResponse::ok(""))
            .await
            .unwrap();
        assert!(untouched.cookies().is_empty());

        let token = get_token(&request.clone()).unwrap();
        assert_eq!(token.len(), CSRF_KEY_LENGTH);
        let response = middleware()
            .process_response(&request, HttpResponse::ok(""))
            .await
            .unwrap();
        assert_eq!(response.cookies().get("csrftoken").map(|c| c.value.clone()), Some(token));
        assert_eq!(response.get_header("Vary"), Some("Cookie"));
    }

    #[tokio::test]
    async fn test_post_without_cookie_rejected() {
        let mut request = HttpRequest::builder().method(Method::POST).path("/").build();
        let response = run_view(&mut request, &view()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(String::from_utf8_lossy(response.content()).contains(REASON_NO_CSRF_COOKIE));
    }

    #[tokio::test]
    async fn test_post_with_matching_header_accepted() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .path("/")
            .header("cookie", "csrftoken=abcdef123456")
            .header("x-csrftoken", "abcdef123456")
            .build();
        assert!(run_view(&mut request, &view()).await.is_none());
    }

    #[tokio::test]
    async fn test_post_with_form_field_accepted_and_mismatch_rejected() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .path("/")
            .content_type("application/x-www-form-urlencoded")
            .header("cookie", "csrftoken=abcdef123456")
            .body(b"csrfmiddlewaretoken=abcdef123456".to_vec())
            .build();
        assert!(run_view(&mut request, &view()).await.is_none());

        let mut wrong = HttpRequest::builder()
            .method(Method::POST)
            .path("/")
            .header("cookie", "csrftoken=abcdef123456")
            .header("x-csrftoken", "zzz")
            .build();
        let response = run_view(&mut wrong, &view()).await.unwrap();
        assert!(String::from_utf8_lossy(response.content()).contains(REASON_BAD_TOKEN));
    }

    #[tokio::test]
    async fn test_secure_request_requires_same_origin_referer() {
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .scheme("https")
            .path("/")
            .header("host", "example.com")
            .header("cookie", "csrftoken=abcdef123456")
            .header("x-csrftoken", "abcdef123456")
            .build();
        let response = run_view(&mut request, &view()).await.unwrap();
        assert!(String::from_utf8_lossy(response.content()).contains(REASON_NO_REFERER));

        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .scheme("https")
            .path("/")
            .header("host", "example.com")
            .header("referer", "https://example.com/form/")
            .header("cookie", "csrftoken=abcdef123456")
            .header("x-csrftoken", "abcdef123456")
            .build();
        assert!(run_view(&mut request, &view()).await.is_none());
    }

    #[tokio::test]
    async fn test_exempt_view_skips_check() {
        let exempt = view().with_csrf_exempt();
        let mut request = HttpRequest::builder().method(Method::POST).path("/").build();
        assert!(run_view(&mut request, &exempt).await.is_none());
        assert!(get_token(&request).is_some());
    }
}
