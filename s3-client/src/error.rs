use std::{fmt, io};

use thiserror::Error;

/// Broad classification of client failures.
///
/// Every operation returns its outcome as an [`S3Error`] carrying one of
/// these kinds; [`ErrorKind::Ok`] appears only in the client's `last_error`
/// slot after a successful call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Not an error.
    Ok,
    /// A caller-supplied argument or configuration field was invalid.
    InvalidArg,
    /// Memory for a request could not be allocated.
    NoMem,
    /// Client or transport initialization failed. Also covers connection
    /// establishment failures (name resolution, connection refused).
    Init,
    /// The transport failed in a way not covered by a more specific kind.
    Transport,
    /// The server answered with a non-2xx HTTP status not covered by a more
    /// specific kind.
    Http,
    /// Request signing failed.
    SigV4,
    /// Reading the request body or writing the response body failed.
    Io,
    /// The connect or request deadline elapsed, or the server answered 408.
    Timeout,
    /// HTTP 404: the object or bucket does not exist.
    NotFound,
    /// HTTP 401: authentication failed.
    Auth,
    /// HTTP 403: the credentials lack permission.
    AccessDenied,
    /// The operation was cancelled before completion.
    Cancelled,
    /// An internal invariant was violated.
    Internal,
}

impl ErrorKind {
    /// Stable identifier for the kind, e.g. for structured log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidArg => "invalid_arg",
            Self::NoMem => "no_mem",
            Self::Init => "init",
            Self::Transport => "transport",
            Self::Http => "http",
            Self::SigV4 => "sigv4",
            Self::Io => "io",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Auth => "auth",
            Self::AccessDenied => "access_denied",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Classify an HTTP status code.
    pub(crate) fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Ok,
            401 => Self::Auth,
            403 => Self::AccessDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            _ => Self::Http,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A populated error record: the kind plus a short human-readable message
/// and, when the failure happened at or after the HTTP exchange, the final
/// HTTP status.
///
/// The record is cheap to clone; the most recent one is also stored in the
/// owning client and can be re-read via
/// [`S3Client::last_error`](crate::S3Client::last_error).
#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub struct S3Error {
    pub kind: ErrorKind,
    pub message: String,
    pub http_status: Option<u16>,
}

impl S3Error {
    /// The "no error" record stored in a fresh client.
    pub fn ok() -> Self {
        Self {
            kind: ErrorKind::Ok,
            message: "Success".to_string(),
            http_status: None,
        }
    }

    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
        }
    }

    pub(crate) fn invalid_arg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArg, message)
    }

    pub(crate) fn init(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Init, message)
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_ok(&self) -> bool {
        self.kind == ErrorKind::Ok
    }

    /// Classify a final HTTP status. 2xx yields `None`; anything else yields
    /// a populated record with `http_status` set and a short message.
    pub(crate) fn check_http_status(status: u16) -> Option<Self> {
        let kind = ErrorKind::from_http_status(status);
        if kind == ErrorKind::Ok {
            return None;
        }
        Some(Self {
            kind,
            message: format!("HTTP status {status}"),
            http_status: Some(status),
        })
    }

    /// Map a transport-level failure onto the error taxonomy.
    ///
    /// Timeouts map to [`ErrorKind::Timeout`], connection establishment
    /// failures to [`ErrorKind::Init`], body transfer failures to
    /// [`ErrorKind::Io`], and everything else to [`ErrorKind::Transport`].
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_connect() {
            ErrorKind::Init
        } else if err.is_body() || err.is_decode() {
            ErrorKind::Io
        } else {
            ErrorKind::Transport
        };
        Self {
            kind,
            // `:#` flattens the source chain into one line.
            message: format!("{err:#}"),
            http_status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<io::Error> for S3Error {
    fn from(err: io::Error) -> Self {
        Self::io(format!("{err:#}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorKind::from_http_status(200), ErrorKind::Ok);
        assert_eq!(ErrorKind::from_http_status(204), ErrorKind::Ok);
        assert_eq!(ErrorKind::from_http_status(299), ErrorKind::Ok);
        assert_eq!(ErrorKind::from_http_status(401), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_http_status(403), ErrorKind::AccessDenied);
        assert_eq!(ErrorKind::from_http_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(408), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_http_status(400), ErrorKind::Http);
        assert_eq!(ErrorKind::from_http_status(500), ErrorKind::Http);
        assert_eq!(ErrorKind::from_http_status(301), ErrorKind::Http);
    }

    #[test]
    fn check_http_status_populates_record() {
        assert!(S3Error::check_http_status(200).is_none());
        let err = S3Error::check_http_status(404).expect("404 is an error");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.http_status, Some(404));
        assert_eq!(err.message, "HTTP status 404");
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = S3Error {
            kind: ErrorKind::NotFound,
            message: "HTTP status 404".to_string(),
            http_status: Some(404),
        };
        assert_eq!(err.to_string(), "not_found: HTTP status 404");

        let ok = S3Error::ok();
        assert_eq!(ok.to_string(), "ok: Success");
        assert!(ok.is_ok());
    }
}
