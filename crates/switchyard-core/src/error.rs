//! Core error types for switchyard.
//!
//! This module provides the error enum [`SwitchyardError`] shared by the
//! resolver, the dispatch pipeline and the middleware layer. Its variants
//! follow the dispatch taxonomy: failures that route to a 404 or 403 page,
//! reverse-lookup failures that always reach the caller, startup
//! configuration defects, and everything else (uncaught failures).

use std::fmt;

use thiserror::Error;

/// Diagnostic payload for a path that no resolver entry matched.
///
/// `tried` holds one entry per attempted pattern. Each entry is the chain of
/// pattern sources from the outermost resolver down to the pattern that
/// failed, so nested includes show up as multi-element chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnresolvedPath {
    /// The portion of the path left over when matching failed.
    pub path: String,
    /// The patterns attempted, outermost first.
    pub tried: Vec<Vec<String>>,
}

impl UnresolvedPath {
    /// Creates a payload for `path` with an empty trail.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tried: Vec::new(),
        }
    }
}

impl fmt::Display for UnresolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no pattern matched '{}' ({} tried)",
            self.path,
            self.tried.len()
        )
    }
}

/// The primary error type for switchyard.
///
/// Each variant maps to an HTTP status code via [`SwitchyardError::status_code`].
/// Only [`NotFound`](Self::NotFound), [`Resolver404`](Self::Resolver404) and
/// [`PermissionDenied`](Self::PermissionDenied) are routed to dedicated
/// handlers by the pipeline; the rest are uncaught failures.
#[derive(Error, Debug)]
pub enum SwitchyardError {
    // ── HTTP errors ──────────────────────────────────────────────────

    /// HTTP 400 Bad Request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 403 Forbidden / Permission Denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// HTTP 404 raised explicitly by a view or middleware.
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 404 raised by the resolver, carrying the tried trail.
    #[error("Not found: {0}")]
    Resolver404(Box<UnresolvedPath>),

    /// HTTP 500 Internal Server Error.
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    // ── URL resolution ───────────────────────────────────────────────

    /// A reverse lookup produced no consistent path.
    #[error("No reverse match: {0}")]
    NoReverseMatch(String),

    /// A dotted view path could not be resolved to a registered view.
    #[error("View does not exist: {0}")]
    ViewDoesNotExist(String),

    /// The caller supplied an invalid combination of arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The framework is improperly configured.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// Raised by a middleware factory to opt out of the pipeline.
    #[error("Middleware not used: {0}")]
    MiddlewareNotUsed(String),

    // ── Responses ────────────────────────────────────────────────────

    /// A header name or value contained a newline.
    #[error("Bad header: {0}")]
    BadHeader(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Security ─────────────────────────────────────────────────────

    /// A potentially malicious operation was detected.
    #[error("Suspicious operation: {0}")]
    SuspiciousOperation(String),
}

impl SwitchyardError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `BadRequest`, `SuspiciousOperation` -> 400
    /// - `PermissionDenied` -> 403
    /// - `NotFound`, `Resolver404` -> 404
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::SuspiciousOperation(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) | Self::Resolver404(_) => 404,
            Self::InternalServerError(_)
            | Self::NoReverseMatch(_)
            | Self::ViewDoesNotExist(_)
            | Self::InvalidArguments(_)
            | Self::ConfigurationError(_)
            | Self::ImproperlyConfigured(_)
            | Self::MiddlewareNotUsed(_)
            | Self::BadHeader(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 500,
        }
    }

    /// Returns `true` for the two 404 variants.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Resolver404(_))
    }

    /// Builds a [`Resolver404`](Self::Resolver404) from its payload.
    pub fn unresolved(path: impl Into<String>, tried: Vec<Vec<String>>) -> Self {
        Self::Resolver404(Box::new(UnresolvedPath {
            path: path.into(),
            tried,
        }))
    }
}

/// A convenience type alias for `Result<T, SwitchyardError>`.
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SwitchyardError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(SwitchyardError::PermissionDenied("x".into()).status_code(), 403);
        assert_eq!(SwitchyardError::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            SwitchyardError::unresolved("x/", Vec::new()).status_code(),
            404
        );
        assert_eq!(SwitchyardError::NoReverseMatch("x".into()).status_code(), 500);
        assert_eq!(
            SwitchyardError::ImproperlyConfigured("x".into()).status_code(),
            500
        );
        assert_eq!(SwitchyardError::BadHeader("x".into()).status_code(), 500);
    }

    #[test]
    fn test_is_not_found() {
        assert!(SwitchyardError::NotFound("x".into()).is_not_found());
        assert!(SwitchyardError::unresolved("x", Vec::new()).is_not_found());
        assert!(!SwitchyardError::PermissionDenied("x".into()).is_not_found());
    }

    #[test]
    fn test_unresolved_display() {
        let err = SwitchyardError::unresolved(
            "blog/x/",
            vec![vec!["^admin/".into()], vec!["^blog/".into(), "^$".into()]],
        );
        assert_eq!(err.to_string(), "Not found: no pattern matched 'blog/x/' (2 tried)");
    }

    #[test]
    fn test_display() {
        let err = SwitchyardError::NoReverseMatch("Reverse for 'x' not found.".into());
        assert_eq!(err.to_string(), "No reverse match: Reverse for 'x' not found.");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SwitchyardError = io_err.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("file missing"));
    }
}
