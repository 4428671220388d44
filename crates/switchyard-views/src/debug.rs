//! Diagnostic pages served instead of the error views when `debug` is on.

use std::fmt::Write;

use switchyard_core::SwitchyardError;
use switchyard_http::utils::escape_html;
use switchyard_http::HttpRequest;
use switchyard_http::HttpResponse;

const STYLE: &str = "body{font:small sans-serif;margin:0}\
    #summary{padding:10px 20px;background:#ffc;border-bottom:1px solid #ddd}\
    #info{padding:10px 20px}\
    table{border:none;border-collapse:collapse}\
    th,td{padding:2px 8px;text-align:left;vertical-align:top}\
    code{font-family:monospace}";

fn page(title: &str, summary: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title}</title><style>{STYLE}</style></head>\
         <body><div id=\"summary\">{summary}</div><div id=\"info\">{body}</div></body></html>",
        title = escape_html(title),
    )
}

/// The 404 page listing the patterns the resolver tried.
pub fn technical_404_response(request: &HttpRequest, error: &SwitchyardError) -> HttpResponse {
    let mut body = String::new();
    match error {
        SwitchyardError::Resolver404(unresolved) if !unresolved.tried.is_empty() => {
            body.push_str("<p>Switchyard tried these URL patterns, in this order:</p><ol>");
            for chain in &unresolved.tried {
                let joined: Vec<String> = chain.iter().map(|p| escape_html(p)).collect();
                let _ = write!(body, "<li><code>{}</code></li>", joined.join(" "));
            }
            let _ = write!(
                body,
                "</ol><p>The current URL, <code>{}</code>, didn't match any of these.</p>",
                escape_html(&unresolved.path)
            );
        }
        SwitchyardError::Resolver404(_) => {
            body.push_str("<p>The URL configuration is empty.</p>");
        }
        other => {
            let _ = write!(body, "<p>{}</p>", escape_html(&other.to_string()));
        }
    }

    let summary = format!(
        "<h1>Page not found <span>(404)</span></h1><table>\
         <tr><th>Request Method:</th><td>{}</td></tr>\
         <tr><th>Request URL:</th><td>{}</td></tr></table>",
        escape_html(request.method().as_str()),
        escape_html(&request.build_absolute_uri(None)),
    );
    HttpResponse::not_found(page("Page not found at ", &summary, &body))
}

/// The 500 page describing an uncaught failure.
pub fn technical_500_response(request: &HttpRequest, error: &SwitchyardError) -> HttpResponse {
    let summary = format!(
        "<h1>Internal Server Error <span>(500)</span></h1><pre>{}</pre><table>\
         <tr><th>Request Method:</th><td>{}</td></tr>\
         <tr><th>Request URL:</th><td>{}</td></tr></table>",
        escape_html(&error.to_string()),
        escape_html(request.method().as_str()),
        escape_html(&request.build_absolute_uri(None)),
    );

    let mut meta: Vec<(&String, &String)> = request.meta().iter().collect();
    meta.sort();
    let mut body = String::from("<h2>Request information</h2><table><tr><th>Variable</th><th>Value</th></tr>");
    for (key, value) in meta {
        let _ = write!(
            body,
            "<tr><td>{}</td><td><pre>{}</pre></td></tr>",
            escape_html(key),
            escape_html(value)
        );
    }
    body.push_str("</table>");
    HttpResponse::server_error(page("Internal Server Error", &summary, &body))
}
