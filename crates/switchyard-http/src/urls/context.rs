//! Per-request URL context.
//!
//! The dispatch pipeline runs each request inside [`with_url_context`], which
//! scopes the script prefix and the active URL configuration to that task.
//! The context is dropped when the scoped future completes, errors, panics or
//! is cancelled, so nothing leaks into the next request handled on the same
//! worker thread.

use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static URL_CONTEXT: UrlContext;
}

/// URL state for one request.
#[derive(Debug)]
pub struct UrlContext {
    script_prefix: String,
    urlconf: RefCell<Option<String>>,
}

impl UrlContext {
    /// A context with the given script prefix. A trailing `/` is added if missing.
    pub fn new(script_prefix: &str) -> Self {
        let mut script_prefix = script_prefix.to_string();
        if !script_prefix.ends_with('/') {
            script_prefix.push('/');
        }
        Self {
            script_prefix,
            urlconf: RefCell::new(None),
        }
    }

    /// Sets the URL configuration override.
    #[must_use]
    pub fn with_urlconf(self, urlconf: Option<String>) -> Self {
        *self.urlconf.borrow_mut() = urlconf;
        self
    }
}

impl Default for UrlContext {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Runs `fut` with `context` as the task's URL context.
pub async fn with_url_context<F: Future>(context: UrlContext, fut: F) -> F::Output {
    URL_CONTEXT.scope(context, fut).await
}

/// Runs `f` with `context` as the URL context.
pub fn with_url_context_sync<R>(context: UrlContext, f: impl FnOnce() -> R) -> R {
    URL_CONTEXT.sync_scope(context, f)
}

/// The script prefix of the current request, or `/` outside a request.
pub fn get_script_prefix() -> String {
    URL_CONTEXT
        .try_with(|context| context.script_prefix.clone())
        .unwrap_or_else(|_| "/".to_string())
}

/// The URL configuration override of the current request, if any.
pub fn get_urlconf() -> Option<String> {
    URL_CONTEXT
        .try_with(|context| context.urlconf.borrow().clone())
        .ok()
        .flatten()
}

/// Sets (or with `None`, clears) the current request's URL configuration.
///
/// Returns `false` when called outside a URL context, in which case nothing
/// is stored.
pub fn set_urlconf(urlconf: Option<String>) -> bool {
    URL_CONTEXT
        .try_with(|context| *context.urlconf.borrow_mut() = urlconf)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_outside_context() {
        assert_eq!(get_script_prefix(), "/");
        assert_eq!(get_urlconf(), None);
        assert!(!set_urlconf(Some("x".into())));
        assert_eq!(get_urlconf(), None);
    }

    #[tokio::test]
    async fn test_scoped_context() {
        let context = UrlContext::new("/mount").with_urlconf(Some("site.urls".into()));
        with_url_context(context, async {
            assert_eq!(get_script_prefix(), "/mount/");
            assert_eq!(get_urlconf().as_deref(), Some("site.urls"));
            tokio::task::yield_now().await;
            assert!(set_urlconf(Some("other.urls".into())));
            assert_eq!(get_urlconf().as_deref(), Some("other.urls"));
        })
        .await;
        assert_eq!(get_urlconf(), None);
        assert_eq!(get_script_prefix(), "/");
    }

    #[tokio::test]
    async fn test_context_cleared_after_error() {
        let result: Result<(), &str> = with_url_context(
            UrlContext::default().with_urlconf(Some("failing.urls".into())),
            async { Err("boom") },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(get_urlconf(), None);
    }

    #[tokio::test]
    async fn test_concurrent_contexts_are_isolated() {
        let a = tokio::spawn(with_url_context(UrlContext::new("/a/"), async {
            tokio::task::yield_now().await;
            get_script_prefix()
        }));
        let b = tokio::spawn(with_url_context(UrlContext::new("/b/"), async {
            tokio::task::yield_now().await;
            get_script_prefix()
        }));
        assert_eq!(a.await.unwrap(), "/a/");
        assert_eq!(b.await.unwrap(), "/b/");
    }

    #[test]
    fn test_sync_scope() {
        let prefix = with_url_context_sync(UrlContext::new("/sync"), get_script_prefix);
        assert_eq!(prefix, "/sync/");
    }
}
