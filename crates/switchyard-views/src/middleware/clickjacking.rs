//! Clickjacking protection through the `X-Frame-Options` header.

use std::sync::Arc;

use async_trait::async_trait;

use switchyard_core::{Settings, SwitchyardResult};
use switchyard_http::{HttpRequest, HttpResponse};

use super::{Middleware, MiddlewareHooks, ProcessResponse};

/// Sets `X-Frame-Options` on every response.
///
/// The value comes from the `x_frame_options` setting (`SAMEORIGIN` by
/// default). Responses that already carry the header, or that a view marked
/// exempt, are left alone.
#[derive(Debug, Clone)]
pub struct XFrameOptionsMiddleware {
    value: String,
}

impl XFrameOptionsMiddleware {
    /// Builds the middleware from `x_frame_options`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            value: settings.x_frame_options.to_ascii_uppercase(),
        }
    }

    /// The header value this middleware sets.
    pub fn value(&self) -> &str {
        &self.value
    }
}

#[async_trait]
impl ProcessResponse for XFrameOptionsMiddleware {
    async fn process_response(&self, _request: &HttpRequest, mut response: HttpResponse) -> SwitchyardResult<HttpResponse> {
        if response.has_header("X-Frame-Options") || response.xframe_options_exempt() {
            return Ok(response);
        }
        response.set_header("X-Frame-Options", self.value.clone())?;
        Ok(response)
    }
}

impl Middleware for XFrameOptionsMiddleware {
    fn hooks(self: Arc<Self>) -> MiddlewareHooks {
        MiddlewareHooks::new().response(self)
    }
}
