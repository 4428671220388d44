//! Response normalization passes.
//!
//! The pipeline runs [`apply_response_fixes`] on every outgoing response,
//! after response middleware, regardless of how the response was produced.

use switchyard_core::SwitchyardResult;

use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// A single normalization pass.
pub type ResponseFix = fn(&HttpRequest, &mut HttpResponse) -> SwitchyardResult<()>;

/// The passes in the order they are applied.
pub const RESPONSE_FIXES: [ResponseFix; 4] = [
    fix_location_header,
    conditional_content_removal,
    fix_ie_for_attach,
    fix_ie_for_vary,
];

/// Applies every pass in [`RESPONSE_FIXES`].
pub fn apply_response_fixes(request: &HttpRequest, response: &mut HttpResponse) -> SwitchyardResult<()> {
    for fix in RESPONSE_FIXES {
        fix(request, response)?;
    }
    Ok(())
}

/// Makes a relative `Location` header absolute.
pub fn fix_location_header(request: &HttpRequest, response: &mut HttpResponse) -> SwitchyardResult<()> {
    if let Some(location) = response.get_header("Location") {
        let absolute = request.build_absolute_uri(Some(location));
        response.set_header("Location", absolute)?;
    }
    Ok(())
}

/// Strips the body where HTTP forbids one.
///
/// 1xx, 204 and 304 responses lose their content and get
/// `Content-Length: 0`; responses to HEAD lose their content only.
pub fn conditional_content_removal(
    request: &HttpRequest,
    response: &mut HttpResponse,
) -> SwitchyardResult<()> {
    let status = response.status().as_u16();
    if (100..200).contains(&status) || status == 204 || status == 304 {
        clear_content(response);
        response.set_header("Content-Length", "0")?;
    }
    if request.method() == http::Method::HEAD {
        clear_content(response);
    }
    Ok(())
}

fn clear_content(response: &mut HttpResponse) {
    // Dropping the stream releases whatever it holds.
    drop(response.take_stream());
    response.set_content(Vec::new());
}

fn is_msie(request: &HttpRequest) -> bool {
    request
        .header("user-agent")
        .is_some_and(|ua| ua.to_ascii_uppercase().contains("MSIE"))
}

/// Old Internet Explorer can't download attachments served with
/// `no-cache`/`no-store`; drop those directives for it.
pub fn fix_ie_for_attach(request: &HttpRequest, response: &mut HttpResponse) -> SwitchyardResult<()> {
    if !is_msie(request) || !response.has_header("Content-Disposition") {
        return Ok(());
    }
    response.remove_header("Pragma");
    if let Some(cache_control) = response.get_header("Cache-Control") {
        let kept: Vec<String> = cache_control
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .filter(|v| {
                let lower = v.to_ascii_lowercase();
                lower != "no-cache" && lower != "no-store"
            })
            .map(str::to_string)
            .collect();
        if kept.is_empty() {
            response.remove_header("Cache-Control");
        } else {
            response.set_header("Cache-Control", kept.join(", "))?;
        }
    }
    Ok(())
}

/// Old Internet Explorer won't cache non-HTML responses carrying `Vary`.
pub fn fix_ie_for_vary(request: &HttpRequest, response: &mut HttpResponse) -> SwitchyardResult<()> {
    if !is_msie(request) {
        return Ok(());
    }
    let mime = response
        .get_header("Content-Type")
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !matches!(mime.as_str(), "text/html" | "text/plain" | "text/sgml") {
        response.remove_header("Vary");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    const MSIE: &str = "Mozilla/4.0 (compatible; MSIE 8.0; Windows NT 6.1)";

    #[test]
    fn test_fix_location_header() {
        let request = HttpRequest::builder()
            .path("/articles/")
            .header("host", "example.com")
            .build();
        let mut response = HttpResponse::redirect("/login/").unwrap();
        fix_location_header(&request, &mut response).unwrap();
        assert_eq!(response.get_header("Location"), Some("http://example.com/login/"));

        let mut response = HttpResponse::redirect("https://other.org/").unwrap();
        fix_location_header(&request, &mut response).unwrap();
        assert_eq!(response.get_header("Location"), Some("https://other.org/"));
    }

    #[test]
    fn test_content_removal_for_bodyless_statuses() {
        let request = HttpRequest::builder().build();
        for status in [StatusCode::NO_CONTENT, StatusCode::NOT_MODIFIED, StatusCode::CONTINUE] {
            let mut response = HttpResponse::with_status(status, "body");
            conditional_content_removal(&request, &mut response).unwrap();
            assert!(response.content().is_empty());
            assert_eq!(response.get_header("Content-Length"), Some("0"));
        }
    }

    #[test]
    fn test_content_removal_for_head() {
        let request = HttpRequest::builder().method(Method::HEAD).build();
        let mut response = HttpResponse::ok("body");
        response.set_header("Content-Length", "4").unwrap();
        conditional_content_removal(&request, &mut response).unwrap();
        assert!(response.content().is_empty());
        assert_eq!(response.get_header("Content-Length"), Some("4"));
    }

    #[test]
    fn test_get_keeps_content() {
        let request = HttpRequest::builder().build();
        let mut response = HttpResponse::ok("body");
        apply_response_fixes(&request, &mut response).unwrap();
        assert_eq!(response.content(), b"body");
    }

    #[test]
    fn test_fix_ie_for_attach() {
        let request = HttpRequest::builder().header("user-agent", MSIE).build();
        let mut response = HttpResponse::ok("");
        response.set_header("Content-Disposition", "attachment; filename=a.csv").unwrap();
        response.set_header("Pragma", "no-cache").unwrap();
        response.set_header("Cache-Control", "no-cache, max-age=60, no-store").unwrap();
        fix_ie_for_attach(&request, &mut response).unwrap();
        assert!(!response.has_header("Pragma"));
        assert_eq!(response.get_header("Cache-Control"), Some("max-age=60"));

        let mut response = HttpResponse::ok("");
        response.set_header("Content-Disposition", "attachment").unwrap();
        response.set_header("Cache-Control", "no-cache").unwrap();
        fix_ie_for_attach(&request, &mut response).unwrap();
        assert!(!response.has_header("Cache-Control"));
    }

    #[test]
    fn test_fix_ie_for_vary() {
        let request = HttpRequest::builder().header("user-agent", MSIE).build();
        let mut response =
            HttpResponse::with_content_type(StatusCode::OK, "", "application/pdf").unwrap();
        response.set_header("Vary", "Accept-Encoding").unwrap();
        fix_ie_for_vary(&request, &mut response).unwrap();
        assert!(!response.has_header("Vary"));

        let mut html = HttpResponse::ok("");
        html.set_header("Vary", "Cookie").unwrap();
        fix_ie_for_vary(&request, &mut html).unwrap();
        assert_eq!(html.get_header("Vary"), Some("Cookie"));

        let other = HttpRequest::builder().header("user-agent", "curl/8").build();
        let mut pdf =
            HttpResponse::with_content_type(StatusCode::OK, "", "application/pdf").unwrap();
        pdf.set_header("Vary", "Cookie").unwrap();
        fix_ie_for_vary(&other, &mut pdf).unwrap();
        assert!(pdf.has_header("Vary"));
    }
}
