//! Logging integration.
//!
//! The pipeline emits [`tracing`] events; [`setup_logging`] installs a
//! subscriber for them and [`request_span`] opens the span every handled
//! request runs inside.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::settings::Settings;

/// The filter built from `settings.log_level`, or `info` if it doesn't parse.
pub fn level_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the process-wide subscriber.
///
/// Debug builds of a site get pretty multi-line output with source
/// locations; otherwise every event is a JSON line. Only the first call has
/// any effect.
pub fn setup_logging(settings: &Settings) {
    let registry = Registry::default().with(level_filter(settings));
    let installed = if settings.debug {
        registry
            .with(fmt::layer().pretty().with_file(true).with_line_number(true))
            .try_init()
    } else {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    };
    if installed.is_err() {
        tracing::debug!("A tracing subscriber is already installed");
    }
}

/// The span for one pass through the dispatch pipeline.
///
/// # Examples
///
/// ```
/// use switchyard_core::logging::request_span;
///
/// let span = request_span("GET", "/articles/");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("request", method = method, path = path)
}
