//! HTTP request value.
//!
//! [`HttpRequest`] is the opaque request object handed through the dispatch
//! pipeline. It exposes the method, path, headers, a mutable metadata map,
//! cookies and an optional URL-configuration override. Middleware attaches
//! per-request flags through [`HttpRequest::extensions_mut`].

use std::collections::HashMap;
use std::sync::OnceLock;

use http::{Extensions, HeaderMap, Method};

use crate::cookies::{self, CookieError};
use crate::urls::resolver::ResolverMatch;

/// An incoming HTTP request.
///
/// Instances are created from an axum request via [`HttpRequest::from_axum`]
/// or, in tests, through [`HttpRequest::builder`].
///
/// # Examples
///
/// ```
/// use switchyard_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .method(http::Method::GET)
///     .path("/articles/2024/")
///     .query_string("page=1")
///     .build();
///
/// assert_eq!(request.method(), &http::Method::GET);
/// assert_eq!(request.path(), "/articles/2024/");
/// assert_eq!(request.get_param("page").as_deref(), Some("1"));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    path_info: String,
    script_name: String,
    query_string: String,
    headers: HeaderMap,
    meta: HashMap<String, String>,
    body: Vec<u8>,
    resolver_match: Option<ResolverMatch>,
    scheme: String,
    urlconf: Option<String>,
    cached_cookies: OnceLock<HashMap<String, String>>,
    extensions: Extensions,
}

impl HttpRequest {
    /// Creates a new [`HttpRequestBuilder`].
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates an `HttpRequest` from the parts of an axum request and its body.
    pub fn from_axum(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let method = parts.method;
        let uri = parts.uri;
        let headers = parts.headers;

        let path = uri.path().to_string();
        let query_string = uri.query().unwrap_or("").to_string();

        let mut meta = HashMap::new();
        for (name, value) in &headers {
            let meta_key = format!("HTTP_{}", name.as_str().to_uppercase().replace('-', "_"));
            if let Ok(v) = value.to_str() {
                meta.insert(meta_key, v.to_string());
            }
        }
        if let Some(host) = uri.host() {
            meta.entry("SERVER_NAME".to_string())
                .or_insert_with(|| host.to_string());
        }
        if let Some(ct) = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            meta.insert("CONTENT_TYPE".to_string(), ct.to_string());
        }
        meta.insert("REQUEST_METHOD".to_string(), method.to_string());
        meta.insert("PATH_INFO".to_string(), path.clone());
        meta.insert("QUERY_STRING".to_string(), query_string.clone());
        meta.insert("CONTENT_LENGTH".to_string(), body.len().to_string());

        let forwarded_https = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("https"));
        let scheme = if forwarded_https || uri.scheme_str() == Some("https") {
            "https"
        } else {
            "http"
        };

        Self {
            method,
            path_info: path.clone(),
            path,
            script_name: String::new(),
            query_string,
            headers,
            meta,
            body,
            resolver_match: None,
            scheme: scheme.to_string(),
            urlconf: None,
            cached_cookies: OnceLock::new(),
            extensions: parts.extensions,
        }
    }

    /// Returns the HTTP method.
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full request path, script name included.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path the resolver matches against.
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// Returns the script name the application is mounted under.
    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Returns the raw query string (without the leading `?`).
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the content type of the request body, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .or_else(|| self.meta.get("CONTENT_TYPE").map(String::as_str))
    }

    /// Returns the metadata map (server variables and `HTTP_*` headers).
    pub const fn meta(&self) -> &HashMap<String, String> {
        &self.meta
    }

    /// Returns a mutable reference to the metadata map.
    pub fn meta_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.meta
    }

    /// Returns the raw request body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the first query-string value for `name`.
    pub fn get_param(&self, name: &str) -> Option<String> {
        form_value(self.query_string.as_bytes(), name)
    }

    /// Returns the first form-encoded body value for `name`.
    ///
    /// Only bodies sent as `application/x-www-form-urlencoded` are parsed.
    pub fn post_param(&self, name: &str) -> Option<String> {
        let is_form = self
            .content_type()
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            form_value(&self.body, name)
        } else {
            None
        }
    }

    /// Returns the resolver match, once the path has been resolved.
    pub const fn resolver_match(&self) -> Option<&ResolverMatch> {
        self.resolver_match.as_ref()
    }

    /// Records the resolver match on this request.
    pub fn set_resolver_match(&mut self, resolver_match: ResolverMatch) {
        self.resolver_match = Some(resolver_match);
    }

    /// Returns the URL-configuration override, if the request carries one.
    pub fn urlconf(&self) -> Option<&str> {
        self.urlconf.as_deref()
    }

    /// Sets the URL-configuration used to resolve this request.
    ///
    /// Request middleware may set this; the pipeline re-reads it before
    /// resolving.
    pub fn set_urlconf(&mut self, urlconf: Option<String>) {
        self.urlconf = urlconf;
    }

    /// Per-request extension values set by middleware.
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the per-request extension values.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns `true` if the request was made over HTTPS.
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Returns the URL scheme (`"http"` or `"https"`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the host from the `Host` header, falling back to `SERVER_NAME`.
    pub fn get_host(&self) -> &str {
        self.header("host")
            .or_else(|| self.meta.get("HTTP_HOST").map(String::as_str))
            .or_else(|| self.meta.get("SERVER_NAME").map(String::as_str))
            .unwrap_or("localhost")
    }

    /// Returns the path including the query string.
    ///
    /// ```
    /// use switchyard_http::HttpRequest;
    ///
    /// let request = HttpRequest::builder()
    ///     .path("/articles/")
    ///     .query_string("page=2")
    ///     .build();
    /// assert_eq!(request.get_full_path(), "/articles/?page=2");
    /// ```
    pub fn get_full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    /// Builds an absolute URI for `location`, or for the request itself.
    ///
    /// Relative locations are joined against the current URL; locations that
    /// already carry a scheme are returned unchanged.
    pub fn build_absolute_uri(&self, location: Option<&str>) -> String {
        let host = self.get_host();
        match location {
            Some(loc) if loc.starts_with("http://") || loc.starts_with("https://") => {
                loc.to_string()
            }
            Some(loc) => {
                let current = format!("{}://{host}{}", self.scheme, self.get_full_path());
                url::Url::parse(&current)
                    .and_then(|base| base.join(loc))
                    .map_or_else(
                        |_| format!("{}://{host}/{}", self.scheme, loc.trim_start_matches('/')),
                        String::from,
                    )
            }
            None => format!("{}://{host}{}", self.scheme, self.get_full_path()),
        }
    }

    /// Parses the `Cookie` header. The result is cached on first use.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cached_cookies.get_or_init(|| {
            self.header("cookie")
                .map_or_else(HashMap::new, cookies::parse_cookie_header)
        })
    }

    /// Gets a cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Gets and verifies a cookie set with
    /// [`HttpResponse::set_signed_cookie`](crate::HttpResponse::set_signed_cookie).
    pub fn get_signed_cookie(
        &self,
        name: &str,
        salt: &str,
        secret_key: &str,
        max_age: Option<u64>,
    ) -> Result<String, CookieError> {
        let value = self.cookie(name).ok_or(CookieError::NotFound)?;
        cookies::verify_signed_cookie(value, secret_key, &format!("{name}{salt}"), max_age)
    }
}

fn form_value(encoded: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(encoded)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Builder for [`HttpRequest`] values.
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    script_name: String,
    query_string: String,
    headers: HeaderMap,
    meta: HashMap<String, String>,
    body: Vec<u8>,
    scheme: String,
    urlconf: Option<String>,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            script_name: String::new(),
            query_string: String::new(),
            headers: HeaderMap::new(),
            meta: HashMap::new(),
            body: Vec::new(),
            scheme: "http".to_string(),
            urlconf: None,
        }
    }
}

impl HttpRequestBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Sets the script name. The path info is the path with this prefix removed.
    #[must_use]
    pub fn script_name(mut self, script_name: &str) -> Self {
        self.script_name = script_name.trim_end_matches('/').to_string();
        self
    }

    /// Sets the query string (without leading `?`).
    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    /// Sets the `Content-Type` header.
    #[must_use]
    pub fn content_type(self, ct: &str) -> Self {
        self.header("content-type", ct)
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Sets the scheme (`http` or `https`).
    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// Sets the URL-configuration override.
    #[must_use]
    pub fn urlconf(mut self, urlconf: &str) -> Self {
        self.urlconf = Some(urlconf.to_string());
        self
    }

    /// Builds the [`HttpRequest`].
    pub fn build(self) -> HttpRequest {
        let path_info = self
            .path
            .strip_prefix(self.script_name.as_str())
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(self.path.as_str())
            .to_string();

        let mut meta = self.meta;
        for (name, value) in &self.headers {
            if let Ok(v) = value.to_str() {
                meta.entry(format!(
                    "HTTP_{}",
                    name.as_str().to_uppercase().replace('-', "_")
                ))
                .or_insert_with(|| v.to_string());
            }
        }
        meta.entry("REQUEST_METHOD".to_string())
            .or_insert_with(|| self.method.to_string());
        meta.entry("PATH_INFO".to_string())
            .or_insert_with(|| path_info.clone());
        meta.entry("SCRIPT_NAME".to_string())
            .or_insert_with(|| self.script_name.clone());
        meta.entry("QUERY_STRING".to_string())
            .or_insert_with(|| self.query_string.clone());

        HttpRequest {
            method: self.method,
            path: self.path,
            path_info,
            script_name: self.script_name,
            query_string: self.query_string,
            headers: self.headers,
            meta,
            body: self.body,
            resolver_match: None,
            scheme: self.scheme,
            urlconf: self.urlconf,
            cached_cookies: OnceLock::new(),
            extensions: Extensions::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = HttpRequest::builder().build();
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.path(), "/");
        assert_eq!(req.query_string(), "");
        assert!(req.content_type().is_none());
        assert!(req.body().is_empty());
        assert!(!req.is_secure());
        assert!(req.urlconf().is_none());
    }

    #[test]
    fn test_query_params() {
        let req = HttpRequest::builder()
            .path("/articles/")
            .query_string("page=2&sort=date&q=a%20b")
            .build();
        assert_eq!(req.get_param("page").as_deref(), Some("2"));
        assert_eq!(req.get_param("q").as_deref(), Some("a b"));
        assert_eq!(req.get_param("missing"), None);
    }

    #[test]
    fn test_post_form_data() {
        let req = HttpRequest::builder()
            .method(Method::POST)
            .content_type("application/x-www-form-urlencoded")
            .body(b"username=alice&csrfmiddlewaretoken=abc".to_vec())
            .build();
        assert_eq!(req.post_param("username").as_deref(), Some("alice"));
        assert_eq!(req.post_param("csrfmiddlewaretoken").as_deref(), Some("abc"));
    }

    #[test]
    fn test_post_non_form_data() {
        let req = HttpRequest::builder()
            .method(Method::POST)
            .content_type("application/json")
            .body(b"username=alice".to_vec())
            .build();
        assert_eq!(req.post_param("username"), None);
    }

    #[test]
    fn test_script_name_strips_path_info() {
        let req = HttpRequest::builder()
            .script_name("/app/")
            .path("/app/articles/")
            .build();
        assert_eq!(req.script_name(), "/app");
        assert_eq!(req.path_info(), "/articles/");
        assert_eq!(req.path(), "/app/articles/");
    }

    #[test]
    fn test_get_full_path() {
        let req = HttpRequest::builder().path("/articles/").build();
        assert_eq!(req.get_full_path(), "/articles/");
        let req = HttpRequest::builder()
            .path("/articles/")
            .query_string("page=2")
            .build();
        assert_eq!(req.get_full_path(), "/articles/?page=2");
    }

    #[test]
    fn test_get_host() {
        assert_eq!(HttpRequest::builder().build().get_host(), "localhost");
        let req = HttpRequest::builder().header("host", "example.com").build();
        assert_eq!(req.get_host(), "example.com");
        let req = HttpRequest::builder().meta("SERVER_NAME", "srv").build();
        assert_eq!(req.get_host(), "srv");
    }

    #[test]
    fn test_build_absolute_uri() {
        let req = HttpRequest::builder()
            .path("/articles/")
            .query_string("page=1")
            .header("host", "example.com")
            .build();
        assert_eq!(req.build_absolute_uri(None), "http://example.com/articles/?page=1");
        assert_eq!(req.build_absolute_uri(Some("/other/")), "http://example.com/other/");
        assert_eq!(
            req.build_absolute_uri(Some("path/")),
            "http://example.com/articles/path/"
        );
        assert_eq!(
            req.build_absolute_uri(Some("https://other.com/x")),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_secure_scheme() {
        let req = HttpRequest::builder()
            .scheme("https")
            .header("host", "example.com")
            .build();
        assert!(req.is_secure());
        assert_eq!(req.build_absolute_uri(Some("/s/")), "https://example.com/s/");
    }

    #[test]
    fn test_headers_mirrored_into_meta() {
        let req = HttpRequest::builder()
            .header("accept-language", "fr")
            .build();
        assert_eq!(req.meta().get("HTTP_ACCEPT_LANGUAGE").map(String::as_str), Some("fr"));
        assert_eq!(req.header("Accept-Language"), Some("fr"));
    }

    #[test]
    fn test_urlconf_override() {
        let mut req = HttpRequest::builder().urlconf("alt.urls").build();
        assert_eq!(req.urlconf(), Some("alt.urls"));
        req.set_urlconf(None);
        assert!(req.urlconf().is_none());
    }

    #[test]
    fn test_extensions() {
        #[derive(Clone, Debug, PartialEq)]
        struct Flag(bool);

        let mut req = HttpRequest::builder().build();
        req.extensions_mut().insert(Flag(true));
        let cloned = req.clone();
        assert_eq!(cloned.extensions().get::<Flag>(), Some(&Flag(true)));
    }

    #[test]
    fn test_from_axum() {
        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/articles/?page=1")
            .header("host", "example.com")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap();

        let (parts, ()) = request.into_parts();
        let req = HttpRequest::from_axum(parts, Vec::new());

        assert_eq!(req.path(), "/articles/");
        assert_eq!(req.path_info(), "/articles/");
        assert_eq!(req.query_string(), "page=1");
        assert_eq!(req.get_host(), "example.com");
        assert!(req.is_secure());
        assert_eq!(req.meta().get("HTTP_HOST").map(String::as_str), Some("example.com"));
        assert_eq!(req.meta().get("CONTENT_LENGTH").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_cookies() {
        let req = HttpRequest::builder()
            .header("cookie", "session=abc123; theme=dark")
            .build();
        assert_eq!(req.cookie("session"), Some("abc123"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("missing"), None);
        assert!(HttpRequest::builder().build().cookies().is_empty());
    }

    #[test]
    fn test_signed_cookie_round_trip() {
        let signed = cookies::sign_cookie_value("my-data", "secret", "signedsalt");
        let req = HttpRequest::builder()
            .header("cookie", &format!("signed={signed}"))
            .build();
        assert_eq!(
            req.get_signed_cookie("signed", "salt", "secret", None),
            Ok("my-data".to_string())
        );
        assert_eq!(
            req.get_signed_cookie("signed", "other", "secret", None),
            Err(CookieError::InvalidSignature)
        );
        assert_eq!(
            req.get_signed_cookie("missing", "salt", "secret", None),
            Err(CookieError::NotFound)
        );
    }
}
