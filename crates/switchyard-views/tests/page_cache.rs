//! Site-wide page caching through the update/fetch middleware pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::Method;

use switchyard_core::settings::CacheSettings;
use switchyard_core::Settings;
use switchyard_http::urls::{register_urlconf, url, UrlConf};
use switchyard_http::{HttpRequest, HttpResponse, View};
use switchyard_views::{Handler, MiddlewareLibrary};

fn cached_site(urlconf: &str, location: &str) -> Settings {
    let mut settings = Settings::default();
    settings.debug = false;
    settings.root_urlconf = urlconf.to_string();
    settings.middleware = vec![
        "switchyard.middleware.cache.UpdateCacheMiddleware".to_string(),
        "switchyard.middleware.cache.FetchFromCacheMiddleware".to_string(),
    ];
    settings.caches.insert(
        "default".to_string(),
        CacheSettings {
            location: location.to_string(),
            ..CacheSettings::default()
        },
    );
    settings
}

fn variant_request(method: Method, variant: &str) -> HttpRequest {
    HttpRequest::builder()
        .method(method)
        .path("/p")
        .header("host", "testserver")
        .header("x-variant", variant)
        .build()
}

fn page_view(name: &str, calls: &Arc<AtomicUsize>) -> View {
    let calls = Arc::clone(calls);
    View::new(name, move |req: HttpRequest| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let variant = req.header("x-variant").unwrap_or("none");
        let mut response = HttpResponse::ok(format!("{variant} #{n}"));
        response.set_header("Cache-Control", "max-age=60").unwrap();
        response.set_header("Vary", "X-Variant").unwrap();
        async move { Ok(response) }
    })
}

fn loaded(settings: Settings) -> Handler {
    let mut handler = Handler::new(Arc::new(settings), MiddlewareLibrary::builtin());
    handler.load_middleware().unwrap();
    handler
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_cached_per_vary_header_until_max_age() {
    let calls = Arc::new(AtomicUsize::new(0));
    register_urlconf(
        "page_cache.expiry",
        UrlConf::new(vec![url("^p$", page_view("page_cache.p", &calls), None).unwrap()]),
    );
    let handler = loaded(cached_site("page_cache.expiry", "page-cache-expiry"));

    let first = handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    assert_eq!(first.content(), b"a #1");
    assert!(first.has_header("Expires"));
    assert!(first.has_header("Last-Modified"));

    tokio::time::advance(Duration::from_secs(30)).await;
    let hit = handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    assert_eq!(hit.content(), b"a #1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let other = handler.handle(variant_request(Method::GET, "b")).await.unwrap();
    assert_eq!(other.content(), b"b #2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::advance(Duration::from_secs(31)).await;
    let expired = handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    assert_eq!(expired.content(), b"a #3");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_head_is_served_from_get_entry_and_post_is_never_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    register_urlconf(
        "page_cache.methods",
        UrlConf::new(vec![url("^p$", page_view("page_cache.methods_p", &calls), None).unwrap()]),
    );
    let handler = loaded(cached_site("page_cache.methods", "page-cache-methods"));

    handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    let head = handler.handle(variant_request(Method::HEAD, "a")).await.unwrap();
    assert!(head.content().is_empty());
    assert_eq!(head.get_header("Vary"), Some("X-Variant"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let post = handler.handle(variant_request(Method::POST, "a")).await.unwrap();
    assert_eq!(post.content(), b"a #2");
    let post_again = handler.handle(variant_request(Method::POST, "a")).await.unwrap();
    assert_eq!(post_again.content(), b"a #3");
}

#[tokio::test(start_paused = true)]
async fn test_error_responses_are_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let flaky = View::new("page_cache.flaky", move |_req| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(HttpResponse::server_error("try again")) }
    });
    register_urlconf("page_cache.errors", UrlConf::new(vec![url("^p$", flaky, None).unwrap()]));
    let handler = loaded(cached_site("page_cache.errors", "page-cache-errors"));

    handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    handler.handle(variant_request(Method::GET, "a")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
