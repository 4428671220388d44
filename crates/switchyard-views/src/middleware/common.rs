//! URL normalization, user-agent blocking and ETags.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use regex::Regex;

use switchyard_cache::utils::content_etag;
use switchyard_core::{Settings, SwitchyardError, SwitchyardResult};
use switchyard_http::urls::is_valid_path;
use switchyard_http::utils::urlquote;
use switchyard_http::{HttpRequest, HttpResponse};

use super::{Middleware, MiddlewareHooks, ProcessRequest, ProcessResponse};

/// The "common" middleware.
///
/// Request phase:
///
/// - Rejects user agents matching any of `disallowed_user_agents` with
///   [`SwitchyardError::PermissionDenied`].
/// - With `prepend_www`, redirects `example.com` to `www.example.com`.
/// - With `append_slash`, redirects `/about` to `/about/` when only the
///   slashed path resolves. In debug mode a `POST` that would be redirected
///   fails instead, since the redirect would drop the form data.
///
/// Response phase: with `use_etags`, sets an `ETag` and answers a matching
/// `If-None-Match` with `304 Not Modified`.
#[derive(Debug, Clone)]
pub struct CommonMiddleware {
    disallowed_user_agents: Vec<Regex>,
    prepend_www: bool,
    append_slash: bool,
    debug: bool,
    use_etags: bool,
}

impl CommonMiddleware {
    /// Builds the middleware, compiling the user-agent patterns.
    ///
    /// # Errors
    ///
    /// [`SwitchyardError::ImproperlyConfigured`] for an invalid user-agent regex.
    pub fn from_settings(settings: &Settings) -> SwitchyardResult<Self> {
        let disallowed_user_agents = settings
            .disallowed_user_agents
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    SwitchyardError::ImproperlyConfigured(format!(
                        "Invalid disallowed user agent pattern '{pattern}': {e}"
                    ))
                })
            })
            .collect::<SwitchyardResult<Vec<_>>>()?;
        Ok(Self {
            disallowed_user_agents,
            prepend_www: settings.prepend_www,
            append_slash: settings.append_slash,
            debug: settings.debug,
            use_etags: settings.use_etags,
        })
    }

    fn redirect_target(&self, request: &HttpRequest) -> SwitchyardResult<Option<String>> {
        let old_host = request.get_host();
        let old_path = request.path();
        let mut new_host = old_host.to_string();
        let mut new_path = old_path.to_string();

        if self.prepend_www && !old_host.is_empty() && !old_host.starts_with("www.") {
            new_host = format!("www.{old_host}");
        }

        if self.append_slash && !old_path.ends_with('/') {
            let urlconf = request.urlconf();
            let path_info = request.path_info();
            if !is_valid_path(path_info, urlconf) && is_valid_path(&format!("{path_info}/"), urlconf) {
                new_path.push('/');
                if self.debug && request.method() == Method::POST {
                    return Err(SwitchyardError::InternalServerError(format!(
                        "You called this URL via POST, but the URL doesn't end in a slash and \
                         append_slash is set. The client can't redirect to the slash URL while \
                         keeping the POST data. Change your form to point to {new_host}{new_path} \
                         (note the trailing slash), or set append_slash to false."
                    )));
                }
            }
        }

        if new_host == old_host && new_path == old_path {
            return Ok(None);
        }

        let mut target = if new_host.is_empty() {
            urlquote(&new_path)
        } else {
            format!("{}://{new_host}{}", request.scheme(), urlquote(&new_path))
        };
        if !request.query_string().is_empty() {
            target.push('?');
            target.push_str(request.query_string());
        }
        Ok(Some(target))
    }
}

#[async_trait]
impl ProcessRequest for CommonMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> SwitchyardResult<Option<HttpResponse>> {
        if let Some(user_agent) = request.header("user-agent") {
            if self.disallowed_user_agents.iter().any(|re| re.is_match(user_agent)) {
                tracing::warn!(path = request.path(), status_code = 403, "Forbidden (User agent): {}", request.path());
                return Err(SwitchyardError::PermissionDenied("Disallowed user agent".to_string()));
            }
        }

        match self.redirect_target(request)? {
            Some(target) => Ok(Some(HttpResponse::permanent_redirect(&target)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProcessResponse for CommonMiddleware {
    async fn process_response(&self, request: &HttpRequest, mut response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        if !self.use_etags {
            return Ok(response);
        }
        let etag = match response.get_header("ETag") {
            Some(existing) => Some(existing.to_string()),
            None if response.is_streaming() || response.needs_render() => None,
            None => Some(content_etag(response.content())),
        };
        let Some(etag) = etag else {
            return Ok(response);
        };

        if response.status().is_success() && request.header("if-none-match") == Some(etag.as_str()) {
            let mut not_modified = HttpResponse::not_modified();
            for cookie in response.cookies().values() {
                not_modified.set_cookie(cookie.clone());
            }
            return Ok(not_modified);
        }
        response.set_header("ETag", etag)?;
        Ok(response)
    }
}

impl Middleware for CommonMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new()
            .request(Arc::clone(&self) as Arc<dyn ProcessRequest>)
            .response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use switchyard_http::urls::{register_urlconf, url, UrlConf};
    use switchyard_http::View;

    fn middleware(configure: impl FnOnce(&mut Settings)) -> CommonMiddleware {
        let mut settings = Settings::default();
        configure(&mut settings);
        CommonMiddleware::from_settings(&settings).unwrap()
    }

    fn register_slash_urls(name: &str) {
        let view = View::new("common.about", |_req| async { Ok(HttpResponse::ok("about")) });
        register_urlconf(name, UrlConf::new(vec![url("^about/$", view, None).unwrap()]));
    }

    #[tokio::test]
    async fn test_disallowed_user_agent_is_forbidden() {
        let common = middleware(|s| s.disallowed_user_agents = vec!["^BadBot".to_string()]);
        let mut request = HttpRequest::builder()
            .path("/")
            .header("user-agent", "BadBot/1.0")
            .build();
        let err = common.process_request(&mut request).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::PermissionDenied(_)));
    }

    #[test]
    fn test_invalid_user_agent_pattern() {
        let mut settings = Settings::default();
        settings.disallowed_user_agents = vec!["(".to_string()];
        assert!(matches!(
            CommonMiddleware::from_settings(&settings),
            Err(SwitchyardError::ImproperlyConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_append_slash_redirects_to_valid_path() {
        register_slash_urls("common.slash");
        let common = middleware(|s| s.append_slash = true);
        let mut request = HttpRequest::builder()
            .path("/about")
            .query_string("a=1")
            .header("host", "testserver")
            .urlconf("common.slash")
            .build();
        let response = common.process_request(&mut request).await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.get_header("Location"), Some("http://testserver/about/?a=1"));

        let mut unknown = HttpRequest::builder()
            .path("/nowhere")
            .urlconf("common.slash")
            .build();
        assert!(common.process_request(&mut unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_slash_refuses_post_in_debug() {
        register_slash_urls("common.slash_post");
        let common = middleware(|s| {
            s.append_slash = true;
            s.debug = true;
        });
        let mut request = HttpRequest::builder()
            .method(Method::POST)
            .path("/about")
            .urlconf("common.slash_post")
            .build();
        let err = common.process_request(&mut request).await.unwrap_err();
        assert!(err.to_string().contains("via POST"));
    }

    #[tokio::test]
    async fn test_prepend_www() {
        let common = middleware(|s| s.prepend_www = true);
        let mut request = HttpRequest::builder()
            .path("/blog/")
            .header("host", "example.com")
            .build();
        let response = common.process_request(&mut request).await.unwrap().unwrap();
        assert_eq!(response.get_header("Location"), Some("http://www.example.com/blog/"));
    }

    #[tokio::test]
    async fn test_etag_and_not_modified() {
        let common = middleware(|s| s.use_etags = true);
        let request = HttpRequest::builder().path("/").build();
        let response = common
            .process_response(&request, HttpResponse::ok("hello"))
            .await
            .unwrap();
        let etag = response.get_header("ETag").unwrap().to_string();
        assert_eq!(etag, content_etag(b"hello"));

        let conditional = HttpRequest::builder()
            .path("/")
            .header("if-none-match", &etag)
            .build();
        let mut fresh = HttpResponse::ok("hello");
        fresh.set_cookie(switchyard_http::Cookie::new("kept", "1"));
        let response = common.process_response(&conditional, fresh).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.cookies().contains_key("kept"));
    }

    #[tokio::test]
    async fn test_etags_disabled_by_default() {
        let common = middleware(|_| {});
        let request = HttpRequest::builder().path("/").build();
        let response = common
            .process_response(&request, HttpResponse::ok("hello"))
            .await
            .unwrap();
        assert!(!response.has_header("ETag"));
    }
}
