//! URL routing and resolution.
//!
//! - [`conf`]: URL configurations and the `url`/`include`/`i18n_patterns` helpers
//! - [`pattern`]: leaf patterns binding a regex to a view
//! - [`resolver`]: hierarchical resolution, error views and the reverse index
//! - [`reverse`]: reverse lookup with namespaces
//! - [`registry`]: named configurations, dotted view paths and memoized resolvers
//! - [`context`]: the per-request script prefix and URL configuration override
//! - [`locale`]: translatable patterns and per-language caches
//! - [`regex_helper`]: expansion of regexes into reversible templates
//!
//! # Examples
//!
//! ```
//! use switchyard_http::urls::{include, register_urlconf, resolve, reverse_with, url};
//! use switchyard_http::urls::{ReverseArgs, ReverseOptions, UrlConf};
//! use switchyard_http::{HttpResponse, View};
//!
//! let detail = View::new("shop.detail", |_req| async { Ok(HttpResponse::ok("detail")) });
//! let shop = UrlConf::new(vec![url(r"^(?P<sku>[A-Z0-9]+)/$", detail, Some("detail")).unwrap()]);
//! register_urlconf(
//!     "example.urls",
//!     UrlConf::new(vec![include("^shop/", shop, Some("shop"), None).unwrap()]),
//! );
//!
//! // Forward resolution
//! let m = resolve("/shop/AB12/", Some("example.urls")).unwrap();
//! assert_eq!(m.kwargs["sku"], "AB12");
//! assert_eq!(m.view_name(), "shop:detail");
//!
//! // Reverse resolution
//! let options = ReverseOptions::default().urlconf("example.urls");
//! let path = reverse_with("shop:detail", &ReverseArgs::new().kwarg("sku", "AB12"), &options).unwrap();
//! assert_eq!(path, "/shop/AB12/");
//! ```

pub mod conf;
pub mod context;
pub mod locale;
pub mod pattern;
pub mod regex_helper;
pub mod registry;
pub mod resolver;
pub mod reverse;

pub use conf::{i18n_patterns, include, include_module, include_with, patterns, url, url_with, UrlConf, UrlConfSource};
pub use context::{get_script_prefix, get_urlconf, set_urlconf, with_url_context, UrlContext};
pub use locale::{translatable, PatternSource};
pub use pattern::{Callback, URLPattern};
pub use registry::{
    clear_url_caches, get_callable, get_resolver, is_valid_path, register_urlconf, register_view, resolve,
};
pub use resolver::{ErrorKind, ResolverMatch, URLEntry, URLResolver};
pub use reverse::{reverse, reverse_with, ReverseArgs, ReverseOptions, ReverseTarget};
