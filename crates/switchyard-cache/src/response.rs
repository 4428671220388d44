//! Page snapshots.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use switchyard_http::cookies::Cookie;
use switchyard_http::headers::ResponseHeaders;
use switchyard_http::HttpResponse;

/// The parts of a rendered, buffered response the page cache keeps.
///
/// A hit builds a fresh [`HttpResponse`] from the snapshot, so middleware
/// that mutates the served response never touches the stored copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    status: u16,
    headers: ResponseHeaders,
    cookies: Vec<Cookie>,
    content: Vec<u8>,
    xframe_options_exempt: bool,
}

impl CachedResponse {
    /// Snapshots `response`. Streaming bodies are stored empty.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            cookies: response.cookies().values().cloned().collect(),
            content: response.content().to_vec(),
            xframe_options_exempt: response.xframe_options_exempt(),
        }
    }

    /// The stored status code.
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// The stored body.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// A new response carrying the stored status, headers, cookies and body.
    pub fn to_response(&self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = HttpResponse::new(status, self.content.clone());
        *response.headers_mut() = self.headers.clone();
        for cookie in &self.cookies {
            response.set_cookie(cookie.clone());
        }
        response.set_xframe_options_exempt(self.xframe_options_exempt);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_restores_response() {
        let mut original = HttpResponse::ok("cached body");
        original.set_header("X-Custom", "yes").unwrap();
        original.set_cookie(Cookie::new("flavour", "oat"));
        original.set_xframe_options_exempt(true);

        let snapshot = CachedResponse::from_response(&original);
        let restored = snapshot.to_response();
        assert_eq!(restored.status(), StatusCode::OK);
        assert_eq!(restored.content(), b"cached body");
        assert_eq!(restored.get_header("x-custom"), Some("yes"));
        assert_eq!(restored.get_header("Content-Type"), original.get_header("Content-Type"));
        assert_eq!(restored.cookies().get("flavour").map(|c| c.value.as_str()), Some("oat"));
        assert!(restored.xframe_options_exempt());
    }

    #[test]
    fn test_restored_response_is_independent() {
        let snapshot = CachedResponse::from_response(&HttpResponse::ok("a"));
        let mut first = snapshot.to_response();
        first.set_content("changed");
        first.set_header("X-Later", "1").unwrap();
        let second = snapshot.to_response();
        assert_eq!(second.content(), b"a");
        assert!(!second.has_header("X-Later"));
    }
}
