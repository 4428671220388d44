//! HTTP utilities shared by the URL layer, the response fixes and middleware.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left untouched by [`iri_to_uri`]: the reserved and unreserved
/// sets of RFC 3986 plus `%` so existing escapes survive.
const IRI_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'#')
    .remove(b'%')
    .remove(b'[')
    .remove(b']')
    .remove(b'=')
    .remove(b':')
    .remove(b';')
    .remove(b'$')
    .remove(b'&')
    .remove(b'(')
    .remove(b')')
    .remove(b'+')
    .remove(b',')
    .remove(b'!')
    .remove(b'?')
    .remove(b'*')
    .remove(b'@')
    .remove(b'\'')
    .remove(b'~')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// Characters left untouched by [`urlquote`].
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Converts an IRI (which may contain non-ASCII characters) to a URI.
///
/// Characters that are already legal in a URI, including `%`, are kept, so
/// the function is idempotent.
///
/// ```
/// use switchyard_http::utils::iri_to_uri;
///
/// assert_eq!(iri_to_uri("/blog/for/Jürgen Münster/"), "/blog/for/J%C3%BCrgen%20M%C3%BCnster/");
/// assert_eq!(iri_to_uri("/a%20b/?x=1&y=2"), "/a%20b/?x=1&y=2");
/// ```
pub fn iri_to_uri(iri: &str) -> String {
    utf8_percent_encode(iri, IRI_SAFE).to_string()
}

/// Percent-quotes a path segment, keeping `/`.
pub fn urlquote(value: &str) -> String {
    utf8_percent_encode(value, PATH_SAFE).to_string()
}

/// Formats a timestamp as an RFC 1123 HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP date in RFC 1123 form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Wraps an ETag in double quotes, escaping embedded quotes and backslashes.
pub fn quote_etag(etag: &str) -> String {
    format!("\"{}\"", etag.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escapes text for inclusion in HTML.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Splits a comma-separated header value into trimmed, non-empty parts.
pub fn split_header_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iri_to_uri_is_idempotent() {
        let once = iri_to_uri("/caf\u{e9}/?q=a b");
        assert_eq!(once, "/caf%C3%A9/?q=a%20b");
        assert_eq!(iri_to_uri(&once), once);
    }

    #[test]
    fn test_urlquote() {
        assert_eq!(urlquote("/my prefix/"), "/my%20prefix/");
        assert_eq!(urlquote("/a?b"), "/a%3Fb");
    }

    #[test]
    fn test_http_date_round_trip() {
        let at = DateTime::parse_from_rfc3339("1994-11-06T08:49:37Z")
            .unwrap()
            .with_timezone(&Utc);
        let formatted = http_date(at);
        assert_eq!(formatted, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&formatted), Some(at));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_quote_etag() {
        assert_eq!(quote_etag("abc"), "\"abc\"");
        assert_eq!(quote_etag("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_split_header_list() {
        let parts: Vec<_> = split_header_list(" Accept-Encoding, ,Cookie ").collect();
        assert_eq!(parts, vec!["Accept-Encoding", "Cookie"]);
    }
}
