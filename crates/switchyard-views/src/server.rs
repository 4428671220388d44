//! HTTP server integration.
//!
//! [`Application`] wraps a loaded [`Handler`] as an axum [`Router`]: every
//! request, whatever its path, goes to the router's fallback service, which
//! runs the dispatch pipeline.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switchyard_core::Settings;
//! use switchyard_http::urls::{register_urlconf, url, UrlConf};
//! use switchyard_http::{HttpResponse, View};
//! use switchyard_views::{Application, MiddlewareLibrary};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let home = View::new("home", |_req| async { Ok(HttpResponse::ok("Hello!")) });
//! register_urlconf("mysite.urls", UrlConf::new(vec![url("^$", home, Some("home"))?]));
//!
//! let mut settings = Settings::default();
//! settings.root_urlconf = "mysite.urls".to_string();
//!
//! let app = Application::new(Arc::new(settings), MiddlewareLibrary::builtin())?;
//! app.run("0.0.0.0:8000").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::StatusCode;

use switchyard_core::{Settings, SwitchyardResult};
use switchyard_http::HttpRequest;

use crate::handler::Handler;
use crate::middleware::MiddlewareLibrary;

/// A loaded pipeline ready to serve HTTP.
#[derive(Debug, Clone)]
pub struct Application {
    handler: Arc<Handler>,
}

impl Application {
    /// Builds the handler and loads its middleware.
    ///
    /// # Errors
    ///
    /// Whatever [`Handler::load_middleware`] returns.
    pub fn new(settings: Arc<Settings>, library: MiddlewareLibrary) -> SwitchyardResult<Self> {
        let mut handler = Handler::new(settings, library);
        handler.load_middleware()?;
        Ok(Self::from_handler(Arc::new(handler)))
    }

    /// Wraps an already loaded handler.
    pub const fn from_handler(handler: Arc<Handler>) -> Self {
        Self { handler }
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// An axum router sending every request through the pipeline.
    pub fn into_router(self) -> Router {
        let handler = self.handler;
        Router::new().fallback(move |request: Request<Body>| {
            let handler = Arc::clone(&handler);
            async move { serve(&handler, request).await }
        })
    }

    /// Binds `addr` and serves until the process is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the address can't be bound or serving fails.
    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(address = addr, "Listening");
        axum::serve(listener, self.into_router()).await
    }
}

async fn serve(handler: &Handler, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    match handler.handle(HttpRequest::from_axum(parts, body)).await {
        Ok(mut response) => {
            response.close();
            response.into_response()
        }
        Err(error) => {
            tracing::error!(error = %error, "Unhandled error escaped the request pipeline");
            (StatusCode::INTERNAL_SERVER_ERROR, "A server error occurred.").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use switchyard_http::urls::{register_urlconf, url, UrlConf};
    use switchyard_http::{HttpResponse, View};
    use switchyard_core::SwitchyardError;
    use tower::ServiceExt;

    fn settings(urlconf: &str) -> Arc<Settings> {
        let mut settings = Settings::default();
        settings.debug = false;
        settings.root_urlconf = urlconf.to_string();
        settings.middleware = vec!["switchyard.middleware.clickjacking.XFrameOptionsMiddleware".to_string()];
        Arc::new(settings)
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_router_dispatches_through_pipeline() {
        let view = View::new("server.greet", |req: HttpRequest| async move {
            let name = req.get_param("name").unwrap_or_default();
            Ok(HttpResponse::ok(format!("hello {name}")))
        });
        register_urlconf("server.urls", UrlConf::new(vec![url("^greet/$", view, None).unwrap()]));

        let router = Application::new(settings("server.urls"), MiddlewareLibrary::builtin())
            .unwrap()
            .into_router();
        let response = router
            .oneshot(Request::builder().uri("/greet/?name=ada").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
        assert_eq!(body_text(response).await, "hello ada");
    }

    #[tokio::test]
    async fn test_fatal_error_becomes_plain_500() {
        let view = View::new("server.broken", |_req| async {
            Err::<HttpResponse, _>(SwitchyardError::InternalServerError("boom".to_string()))
        });
        register_urlconf("server.broken_urls", UrlConf::new(vec![url("^$", view, None).unwrap()]));

        let router = Application::new(settings("server.broken_urls"), MiddlewareLibrary::builtin())
            .unwrap()
            .into_router();
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "A server error occurred.");
    }

    #[test]
    fn test_unknown_middleware_fails_to_build() {
        let mut settings = Settings::default();
        settings.middleware = vec!["nowhere.Middleware".to_string()];
        assert!(Application::new(Arc::new(settings), MiddlewareLibrary::builtin()).is_err());
    }
}
