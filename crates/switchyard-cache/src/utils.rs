//! Helpers for controlling caching by patching response headers, and the
//! key functions of the page cache.
//!
//! A page is stored under a key derived from the request's absolute URI and
//! the values of the request headers its response varies on. The list of
//! varied headers is itself cached per URI (the "header key"), so a later
//! request can rebuild the page key before the view runs.

use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use switchyard_core::{i18n, SwitchyardResult};
use switchyard_http::utils::{http_date, iri_to_uri, quote_etag, split_header_list};
use switchyard_http::{HttpRequest, HttpResponse};

use crate::backend::{CacheBackend, CacheValue};

type Directives = Vec<(String, Option<String>)>;

fn parse_cache_control(value: &str) -> Directives {
    split_header_list(value)
        .map(|item| match item.split_once('=') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(value.trim().to_string())),
            None => (item.to_ascii_lowercase(), None),
        })
        .collect()
}

fn has_directive(directives: &Directives, name: &str) -> bool {
    directives.iter().any(|(n, _)| n == name)
}

/// Adds or updates `Cache-Control` directives.
///
/// Directive names may be written with underscores (`max_age`). A `None`
/// value is a bare flag. When both the existing header and `directives` set
/// `max-age`, the smaller value wins; `public` and `private` replace each
/// other.
///
/// ```
/// use switchyard_cache::utils::patch_cache_control;
/// use switchyard_http::HttpResponse;
///
/// let mut response = HttpResponse::ok("");
/// response.set_header("Cache-Control", "private, max-age=600").unwrap();
/// patch_cache_control(&mut response, &[("max_age", Some("60")), ("public", None)]).unwrap();
/// assert_eq!(response.get_header("Cache-Control"), Some("max-age=60, public"));
/// ```
pub fn patch_cache_control(
    response: &mut HttpResponse,
    directives: &[(&str, Option<&str>)],
) -> SwitchyardResult<()> {
    let mut current = response
        .get_header("Cache-Control")
        .map(parse_cache_control)
        .unwrap_or_default();
    let mut updates: Directives = directives
        .iter()
        .map(|(name, value)| {
            (
                name.replace('_', "-").to_ascii_lowercase(),
                value.map(str::to_string),
            )
        })
        .collect();

    let existing_max_age = current
        .iter()
        .find(|(name, _)| name == "max-age")
        .and_then(|(_, value)| value.as_deref()?.parse::<u64>().ok());
    if let Some(existing) = existing_max_age {
        for (name, value) in &mut updates {
            if name == "max-age" {
                if let Some(new) = value.as_deref().and_then(|v| v.parse::<u64>().ok()) {
                    *value = Some(existing.min(new).to_string());
                }
            }
        }
    }

    if has_directive(&current, "private") && has_directive(&updates, "public") {
        current.retain(|(name, _)| name != "private");
    } else if has_directive(&current, "public") && has_directive(&updates, "private") {
        current.retain(|(name, _)| name != "public");
    }

    for (name, value) in updates {
        match current.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => current.push((name, value)),
        }
    }

    let header = current
        .iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{name}={value}"),
            None => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    response.set_header("Cache-Control", header)
}

/// The `max-age` of the response's `Cache-Control` header, if set and numeric.
pub fn get_max_age(response: &HttpResponse) -> Option<u64> {
    let directives = parse_cache_control(response.get_header("Cache-Control")?);
    directives
        .into_iter()
        .find(|(name, _)| name == "max-age")
        .and_then(|(_, value)| value?.parse().ok())
}

/// A strong ETag for `content`.
pub fn content_etag(content: &[u8]) -> String {
    quote_etag(&hex::encode(Sha256::digest(content)))
}

/// Adds caching headers for a response cached for `cache_timeout` seconds.
///
/// Sets `ETag` (when `use_etags` and the body is available), `Last-Modified`
/// and `Expires` unless present, and caps `Cache-Control: max-age`.
pub fn patch_response_headers(
    response: &mut HttpResponse,
    cache_timeout: u64,
    use_etags: bool,
) -> SwitchyardResult<()> {
    if use_etags && !response.has_header("ETag") && !response.is_streaming() && !response.needs_render() {
        let etag = content_etag(response.content());
        response.set_header("ETag", etag)?;
    }
    let now = Utc::now();
    let expires = i64::try_from(cache_timeout)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now);
    response.headers_mut().set_default("Last-Modified", http_date(now))?;
    response.headers_mut().set_default("Expires", http_date(expires))?;
    patch_cache_control(response, &[("max-age", Some(cache_timeout.to_string().as_str()))])
}

/// Marks a response as never to be cached.
pub fn add_never_cache_headers(response: &mut HttpResponse) -> SwitchyardResult<()> {
    patch_response_headers(response, 0, false)
}

/// Adds `new_headers` to the `Vary` header, skipping names already present
/// in any case.
pub fn patch_vary_headers(response: &mut HttpResponse, new_headers: &[&str]) -> SwitchyardResult<()> {
    let mut vary: Vec<String> = response
        .get_header("Vary")
        .map(|v| split_header_list(v).map(str::to_string).collect())
        .unwrap_or_default();
    for header in new_headers {
        if !vary.iter().any(|existing| existing.eq_ignore_ascii_case(header)) {
            vary.push((*header).to_string());
        }
    }
    response.set_header("Vary", vary.join(", "))
}

/// Whether the response's `Vary` header lists `header`.
pub fn has_vary_header(response: &HttpResponse, header: &str) -> bool {
    response
        .get_header("Vary")
        .is_some_and(|vary| split_header_list(vary).any(|h| h.eq_ignore_ascii_case(header)))
}

fn with_language(mut key: String, use_i18n: bool) -> String {
    if use_i18n {
        key.push('.');
        key.push_str(&i18n::get_language());
    }
    key
}

fn url_digest(request: &HttpRequest) -> String {
    hex::encode(Sha256::digest(iri_to_uri(&request.build_absolute_uri(None))))
}

fn generate_cache_key(
    request: &HttpRequest,
    method: &str,
    header_list: &[String],
    key_prefix: &str,
    use_i18n: bool,
) -> String {
    let mut ctx = Sha256::new();
    for header in header_list {
        if let Some(value) = request.meta().get(header) {
            ctx.update(value.as_bytes());
        }
    }
    let key = format!(
        "switchyard.page.{key_prefix}.{method}.{}.{}",
        url_digest(request),
        hex::encode(ctx.finalize())
    );
    with_language(key, use_i18n)
}

fn generate_cache_header_key(request: &HttpRequest, key_prefix: &str, use_i18n: bool) -> String {
    let key = format!(
        "switchyard.page_headers.{key_prefix}.{}",
        url_digest(request)
    );
    with_language(key, use_i18n)
}

/// The page key for `request` under `method`, if a header list has been
/// learned for its URI.
///
/// `None` means the page can't be looked up and must be rebuilt.
pub async fn get_cache_key(
    request: &HttpRequest,
    key_prefix: &str,
    method: &str,
    cache: &dyn CacheBackend,
    use_i18n: bool,
) -> SwitchyardResult<Option<String>> {
    let header_key = generate_cache_header_key(request, key_prefix, use_i18n);
    let header_list = cache
        .get(&header_key)
        .await?
        .and_then(|value| match value {
            CacheValue::Json(list) => serde_json::from_value::<Vec<String>>(list).ok(),
            _ => None,
        });
    Ok(header_list.map(|headers| generate_cache_key(request, method, &headers, key_prefix, use_i18n)))
}

/// Records the request headers named by a response's `vary` header and
/// returns the page key for `request`.
///
/// The header list is stored for `cache_timeout` seconds under the URI's
/// header key.
pub async fn learn_cache_key(
    request: &HttpRequest,
    vary: Option<&str>,
    cache_timeout: u64,
    key_prefix: &str,
    cache: &dyn CacheBackend,
    use_i18n: bool,
) -> SwitchyardResult<String> {
    let header_list: Vec<String> = vary
        .map(|vary| {
            split_header_list(vary)
                .map(|header| format!("HTTP_{}", header.to_ascii_uppercase().replace('-', "_")))
                .collect()
        })
        .unwrap_or_default();
    let header_key = generate_cache_header_key(request, key_prefix, use_i18n);
    cache
        .set(
            &header_key,
            CacheValue::Json(serde_json::json!(header_list)),
            Some(Duration::from_secs(cache_timeout)),
        )
        .await?;
    Ok(generate_cache_key(
        request,
        request.method().as_str(),
        &header_list,
        key_prefix,
        use_i18n,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryCache;
    use http::Method;

    fn request(path: &str) -> HttpRequest {
        HttpRequest::builder()
            .path(path)
            .header("host", "testserver")
            .build()
    }

    #[test]
    fn test_patch_cache_control_adds_and_replaces() {
        let mut response = HttpResponse::ok("");
        patch_cache_control(&mut response, &[("no_cache", None), ("max_age", Some("60"))]).unwrap();
        assert_eq!(response.get_header("Cache-Control"), Some("no-cache, max-age=60"));

        patch_cache_control(&mut response, &[("max-age", Some("120")), ("private", None)]).unwrap();
        assert_eq!(
            response.get_header("Cache-Control"),
            Some("no-cache, max-age=60, private")
        );
    }

    #[test]
    fn test_patch_cache_control_public_private_exclusive() {
        let mut response = HttpResponse::ok("");
        response.set_header("Cache-Control", "public").unwrap();
        patch_cache_control(&mut response, &[("private", None)]).unwrap();
        assert_eq!(response.get_header("Cache-Control"), Some("private"));
    }

    #[test]
    fn test_get_max_age() {
        let mut response = HttpResponse::ok("");
        assert_eq!(get_max_age(&response), None);
        response.set_header("Cache-Control", "public, max-age=3600").unwrap();
        assert_eq!(get_max_age(&response), Some(3600));
        response.set_header("Cache-Control", "max-age=soon").unwrap();
        assert_eq!(get_max_age(&response), None);
        response.set_header("Cache-Control", "Max-Age=0").unwrap();
        assert_eq!(get_max_age(&response), Some(0));
    }

    #[test]
    fn test_patch_response_headers() {
        let mut response = HttpResponse::ok("page");
        patch_response_headers(&mut response, 60, true).unwrap();
        assert_eq!(response.get_header("ETag"), Some(content_etag(b"page").as_str()));
        assert!(response.has_header("Last-Modified"));
        assert!(response.has_header("Expires"));
        assert_eq!(get_max_age(&response), Some(60));

        let mut response = HttpResponse::ok("page");
        response.set_header("Expires", "Thu, 01 Jan 1970 00:00:00 GMT").unwrap();
        patch_response_headers(&mut response, 60, false).unwrap();
        assert!(!response.has_header("ETag"));
        assert_eq!(response.get_header("Expires"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_never_cache() {
        let mut response = HttpResponse::ok("");
        add_never_cache_headers(&mut response).unwrap();
        assert_eq!(get_max_age(&response), Some(0));
        assert_eq!(response.get_header("Expires"), response.get_header("Last-Modified"));
    }

    #[test]
    fn test_patch_vary_headers() {
        let mut response = HttpResponse::ok("");
        patch_vary_headers(&mut response, &["Accept-Encoding"]).unwrap();
        patch_vary_headers(&mut response, &["accept-encoding", "Cookie"]).unwrap();
        assert_eq!(response.get_header("Vary"), Some("Accept-Encoding, Cookie"));
        assert!(has_vary_header(&response, "cookie"));
        assert!(!has_vary_header(&response, "Accept-Language"));
    }

    fn require_send<F: std::future::Future + Send>(future: F) -> F {
        future
    }

    #[tokio::test]
    async fn test_cache_key_unknown_until_learned() {
        let cache = InMemoryCache::new();
        let request = request("/learn/");
        assert_eq!(get_cache_key(&request, "", "GET", &cache, false).await.unwrap(), None);

        let learned = learn_cache_key(&request, None, 60, "", &cache, false).await.unwrap();
        assert!(learned.starts_with("switchyard.page..GET."));
        let key = get_cache_key(&request, "", "GET", &cache, false).await.unwrap();
        assert_eq!(key.as_deref(), Some(learned.as_str()));
    }

    #[tokio::test]
    async fn test_cache_key_varies_on_headers() {
        let cache = InMemoryCache::new();
        let english = HttpRequest::builder()
            .path("/vary/")
            .header("host", "testserver")
            .header("accept-language", "en")
            .build();
        let german = HttpRequest::builder()
            .path("/vary/")
            .header("host", "testserver")
            .header("accept-language", "de")
            .build();

        // Held across an await inside `Send` middleware futures.
        let learning = require_send(learn_cache_key(&english, Some("Accept-Language"), 60, "site", &cache, false));
        let learned = learning.await.unwrap();

        let same = get_cache_key(&english, "site", "GET", &cache, false).await.unwrap();
        let other = get_cache_key(&german, "site", "GET", &cache, false).await.unwrap();
        assert_eq!(same.as_deref(), Some(learned.as_str()));
        assert!(other.is_some());
        assert_ne!(other, same);
    }

    #[tokio::test]
    async fn test_cache_key_includes_method_and_language() {
        let cache = InMemoryCache::new();
        let head = HttpRequest::builder()
            .method(Method::HEAD)
            .path("/head/")
            .header("host", "testserver")
            .build();
        let learned = learn_cache_key(&head, None, 60, "", &cache, true)
            .await
            .unwrap();
        assert!(learned.contains(".HEAD."));
        assert!(learned.ends_with(".en"));

        let get_key = get_cache_key(&head, "", "GET", &cache, true).await.unwrap();
        assert!(get_key.is_some_and(|k| k.contains(".GET.")));

        let _guard = i18n::override_language("fr");
        assert_eq!(get_cache_key(&head, "", "HEAD", &cache, true).await.unwrap(), None);
    }
}
