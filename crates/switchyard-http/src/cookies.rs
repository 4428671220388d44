//! Cookie parsing, `Set-Cookie` serialization and signed values.
//!
//! Response cookies are plain serde values so cached responses can carry
//! them. Signed values use HMAC-SHA256 over `value:timestamp` and are
//! verified in constant time.

use std::collections::HashMap;
use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as Base64Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The `Expires` value written by [`Cookie::expired`].
pub const EXPIRED_DATE: &str = "Thu, 01-Jan-1970 00:00:00 GMT";

/// Errors that can occur while reading signed cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// The cookie was not found in the request.
    NotFound,
    /// The signature is missing or does not match.
    InvalidSignature,
    /// The signature is older than the allowed age.
    Expired,
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Cookie not found"),
            Self::InvalidSignature => write!(f, "Invalid cookie signature"),
            Self::Expired => write!(f, "Cookie has expired"),
        }
    }
}

impl std::error::Error for CookieError {}

/// The `SameSite` attribute for cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Only sent with same-site requests.
    Strict,
    /// Sent with top-level navigations.
    Lax,
    /// Sent with every request (requires `Secure`).
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "Strict"),
            Self::Lax => write!(f, "Lax"),
            Self::None => write!(f, "None"),
        }
    }
}

/// A cookie to be set on an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// The cookie name.
    pub name: String,
    /// The cookie value.
    pub value: String,
    /// Maximum age in seconds. `None` means a session cookie.
    pub max_age: Option<u64>,
    /// Expiration date, already formatted for the header.
    pub expires: Option<String>,
    /// The path for which the cookie is valid.
    pub path: String,
    /// The domain for which the cookie is valid.
    pub domain: Option<String>,
    /// Only send over HTTPS.
    pub secure: bool,
    /// Hide from client-side scripts.
    pub httponly: bool,
    /// The `SameSite` attribute.
    pub samesite: Option<SameSite>,
}

impl Cookie {
    /// Creates a session cookie valid for `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            expires: None,
            path: "/".to_string(),
            domain: None,
            secure: false,
            httponly: false,
            samesite: None,
        }
    }

    /// Creates the cookie that makes a client drop `name`.
    pub fn expired(name: impl Into<String>) -> Self {
        Self {
            max_age: Some(0),
            expires: Some(EXPIRED_DATE.to_string()),
            ..Self::new(name, "")
        }
    }

    /// Sets the max age and the matching `Expires` date.
    #[must_use]
    pub fn max_age(mut self, max_age: u64) -> Self {
        self.max_age = Some(max_age);
        let at = i64::try_from(max_age)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        if let (None, Some(at)) = (&self.expires, at) {
            self.expires = Some(cookie_date(at));
        }
        self
    }

    /// Sets the expiry from a point in time.
    #[must_use]
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(cookie_date(at));
        self
    }

    /// Sets the path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the secure flag.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the httponly flag.
    #[must_use]
    pub const fn httponly(mut self, httponly: bool) -> Self {
        self.httponly = httponly;
        self
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub const fn samesite(mut self, samesite: SameSite) -> Self {
        self.samesite = Some(samesite);
        self
    }

    /// Formats this cookie as a `Set-Cookie` header value.
    pub fn to_set_cookie_header(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);
        if let Some(ref expires) = self.expires {
            header.push_str("; expires=");
            header.push_str(expires);
        }
        if let Some(max_age) = self.max_age {
            header.push_str(&format!("; Max-Age={max_age}"));
        }
        header.push_str("; Path=");
        header.push_str(&self.path);
        if let Some(ref domain) = self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.httponly {
            header.push_str("; HttpOnly");
        }
        if let Some(samesite) = self.samesite {
            header.push_str(&format!("; SameSite={samesite}"));
        }
        header
    }
}

/// Formats a timestamp the way cookie `expires` attributes expect.
pub fn cookie_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d-%b-%Y %H:%M:%S GMT").to_string()
}

/// Parses a `Cookie` header into name/value pairs.
///
/// Entries without `=` or with an empty name are skipped; the last duplicate
/// wins.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn signature(payload: &str, secret_key: &str, salt: &str) -> HmacSha256 {
    let key = format!("{salt}signer{secret_key}");
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    mac
}

/// Signs `value`, producing `value:timestamp:signature`.
pub fn sign_cookie_value(value: &str, secret_key: &str, salt: &str) -> String {
    let payload = format!("{value}:{}", Utc::now().timestamp());
    let sig = URL_SAFE_NO_PAD.encode(signature(&payload, secret_key, salt).finalize().into_bytes());
    format!("{payload}:{sig}")
}

/// Verifies a value produced by [`sign_cookie_value`] and returns the original.
///
/// When `max_age` is given, signatures older than that many seconds are
/// rejected with [`CookieError::Expired`].
pub fn verify_signed_cookie(
    signed_value: &str,
    secret_key: &str,
    salt: &str,
    max_age: Option<u64>,
) -> Result<String, CookieError> {
    let (payload, sig) = signed_value
        .rsplit_once(':')
        .ok_or(CookieError::InvalidSignature)?;
    let (value, timestamp) = payload
        .rsplit_once(':')
        .ok_or(CookieError::InvalidSignature)?;
    let timestamp: i64 = timestamp.parse().map_err(|_| CookieError::InvalidSignature)?;

    let sig = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| CookieError::InvalidSignature)?;
    signature(payload, secret_key, salt)
        .verify_slice(&sig)
        .map_err(|_| CookieError::InvalidSignature)?;

    if let Some(max_age) = max_age {
        let age = Utc::now().timestamp().saturating_sub(timestamp);
        if u64::try_from(age).unwrap_or(0) > max_age {
            return Err(CookieError::Expired);
        }
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_multiple_cookies() {
        let cookies = parse_cookie_header("name1=value1; name2=value2;  name3 = value3 ");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("name3").map(String::as_str), Some("value3"));
    }

    #[test]
    fn test_parse_malformed_cookies() {
        let cookies = parse_cookie_header("valid=value; malformed; =empty_name; ;;");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("valid").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_parse_cookie_with_equals_in_value() {
        let cookies = parse_cookie_header("token=abc=def; dup=1; dup=2");
        assert_eq!(cookies.get("token").map(String::as_str), Some("abc=def"));
        assert_eq!(cookies.get("dup").map(String::as_str), Some("2"));
    }

    // ── Set-Cookie ──────────────────────────────────────────────────

    #[test]
    fn test_session_cookie_header() {
        assert_eq!(Cookie::new("name", "value").to_set_cookie_header(), "name=value; Path=/");
    }

    #[test]
    fn test_full_cookie_header() {
        let header = Cookie::new("csrftoken", "abc")
            .domain("example.com")
            .path("/app/")
            .secure(true)
            .httponly(true)
            .samesite(SameSite::Lax)
            .to_set_cookie_header();
        assert_eq!(
            header,
            "csrftoken=abc; Path=/app/; Domain=example.com; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_max_age_sets_expires() {
        let cookie = Cookie::new("s", "v").max_age(3600);
        assert_eq!(cookie.max_age, Some(3600));
        let expires = cookie.expires.clone().unwrap();
        assert!(expires.ends_with(" GMT"));
        assert!(cookie.to_set_cookie_header().contains("Max-Age=3600"));
    }

    #[test]
    fn test_expires_at() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T06:07:08Z")
            .unwrap()
            .with_timezone(&Utc);
        let cookie = Cookie::new("s", "v").expires_at(at);
        assert_eq!(cookie.expires.as_deref(), Some("Tue, 05-Mar-2024 06:07:08 GMT"));
    }

    #[test]
    fn test_expired_cookie() {
        let header = Cookie::expired("gone").to_set_cookie_header();
        assert_eq!(header, format!("gone=; expires={EXPIRED_DATE}; Max-Age=0; Path=/"));
    }

    // ── Signing ─────────────────────────────────────────────────────

    #[test]
    fn test_sign_and_verify() {
        let signed = sign_cookie_value("hello:world", "secret", "salt");
        assert_eq!(
            verify_signed_cookie(&signed, "secret", "salt", Some(60)),
            Ok("hello:world".to_string())
        );
    }

    #[test]
    fn test_verify_rejects_wrong_key_or_salt() {
        let signed = sign_cookie_value("data", "secret", "salt");
        assert_eq!(
            verify_signed_cookie(&signed, "other", "salt", None),
            Err(CookieError::InvalidSignature)
        );
        assert_eq!(
            verify_signed_cookie(&signed, "secret", "pepper", None),
            Err(CookieError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signed = sign_cookie_value("data", "secret", "salt");
        let tampered = signed.replacen("data", "DATA", 1);
        assert_eq!(
            verify_signed_cookie(&tampered, "secret", "salt", None),
            Err(CookieError::InvalidSignature)
        );
        assert_eq!(
            verify_signed_cookie("no-signature", "secret", "salt", None),
            Err(CookieError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_expired() {
        let old = Utc::now().timestamp() - 120;
        let payload = format!("data:{old}");
        let sig = URL_SAFE_NO_PAD.encode(signature(&payload, "k", "s").finalize().into_bytes());
        let signed = format!("{payload}:{sig}");
        assert_eq!(verify_signed_cookie(&signed, "k", "s", Some(60)), Err(CookieError::Expired));
        assert!(verify_signed_cookie(&signed, "k", "s", Some(600)).is_ok());
    }
}
