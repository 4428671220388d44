//! Library-wide default error views.
//!
//! A URL configuration that doesn't bind its own `handler403`, `handler404`
//! or `handler500` falls back to these.

use once_cell::sync::Lazy;

use crate::response::HttpResponse;
use crate::utils::escape_html;
use crate::view::View;

static PAGE_NOT_FOUND: Lazy<View> = Lazy::new(|| {
    View::new("switchyard.views.defaults.page_not_found", |request| async move {
        Ok(HttpResponse::not_found(format!(
            "<h1>Not Found</h1><p>The requested URL {} was not found on this server.</p>",
            escape_html(request.path())
        )))
    })
});

static PERMISSION_DENIED: Lazy<View> = Lazy::new(|| {
    View::new("switchyard.views.defaults.permission_denied", |_request| async {
        Ok(HttpResponse::forbidden("<h1>403 Forbidden</h1>"))
    })
});

static SERVER_ERROR: Lazy<View> = Lazy::new(|| {
    View::new("switchyard.views.defaults.server_error", |_request| async {
        Ok(HttpResponse::server_error("<h1>Server Error (500)</h1>"))
    })
});

/// The default 404 view.
pub fn page_not_found() -> View {
    PAGE_NOT_FOUND.clone()
}

/// The default 403 view.
pub fn permission_denied() -> View {
    PERMISSION_DENIED.clone()
}

/// The default 500 view.
pub fn server_error() -> View {
    SERVER_ERROR.clone()
}
