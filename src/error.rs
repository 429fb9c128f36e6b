//! Error taxonomy.
//!
//! Two families live here:
//!
//! - [`Error`]: what a handler or middleware returns. A closed sum type over
//!   the five kinds the pipeline knows how to classify. The Errors middleware
//!   matches it exhaustively, so adding a kind is a compile error until the
//!   classifier handles it.
//! - [`ServeError`]: infrastructure failures such as binding a port, loading
//!   configuration, reading key files. These never reach a client.

use std::fmt;
use std::io;

use http::StatusCode;
use serde::Serialize;

use crate::auth::AuthError;

/// Boxed error used as the opaque cause of unclassified and shutdown errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── Request-path errors ───────────────────────────────────────────────────────

/// The error a handler returns.
///
/// Returning `Ok` means a response has been produced; returning `Err` means
/// exactly one of these kinds, and nothing has been written for that outcome.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Client input failed declared constraints. Always `400`.
    #[error(transparent)]
    Validation(#[from] FieldErrors),

    /// Business logic chose a client-facing status and message.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Authentication or authorization failed. Always `401`, generic body.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The process is no longer safe to keep serving.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// Anything else. `500`, detail stays in the logs.
    #[error(transparent)]
    Unclassified(#[from] Unclassified),
}

impl Error {
    /// A `RequestError` carrying `status` and the display text of `message`.
    pub fn request(message: impl fmt::Display, status: StatusCode) -> Self {
        Self::Request(RequestError::new(message, status))
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(AuthError::new(message))
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown(ShutdownError::new(message))
    }

    /// Wraps any error as unclassified, keeping it as the source.
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unclassified(Unclassified::from_source(err))
    }

    pub fn is_validation(&self) -> bool { matches!(self, Self::Validation(_)) }
    pub fn is_request(&self) -> bool { matches!(self, Self::Request(_)) }
    pub fn is_auth(&self) -> bool { matches!(self, Self::Auth(_)) }
    pub fn is_shutdown(&self) -> bool { matches!(self, Self::Shutdown(_)) }

    pub fn as_validation(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestError> {
        match self {
            Self::Request(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_shutdown(&self) -> Option<&ShutdownError> {
        match self {
            Self::Shutdown(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::internal(e)
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// One field that failed validation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

/// A non-empty list of field failures.
///
/// There is no way to build an empty `FieldErrors`, so a validation response
/// always carries at least one entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self(vec![FieldError { field: field.into(), error: error.into() }])
    }

    /// `None` when `errors` is empty.
    pub fn from_vec(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() { None } else { Some(Self(errors)) }
    }

    pub fn push(&mut self, field: impl Into<String>, error: impl Into<String>) {
        self.0.push(FieldError { field: field.into(), error: error.into() });
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("data validation error")?;
        for (i, fe) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{}: {}", fe.field, fe.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

// ── Request ───────────────────────────────────────────────────────────────────

/// An error whose status and message are meant for the client.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    message: String,
    status: StatusCode,
}

impl RequestError {
    pub fn new(message: impl fmt::Display, status: StatusCode) -> Self {
        Self { message: message.to_string(), status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

/// Signals that service integrity is compromised.
///
/// The only kind the Errors middleware hands back up to the dispatcher.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ShutdownError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ShutdownError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }

    /// True when the cause is the peer dropping the connection (broken pipe
    /// or reset). That is a client problem, not an integrity problem.
    pub fn is_connection_lost(&self) -> bool {
        let mut cause = self
            .source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(e) = cause {
            if let Some(io) = e.downcast_ref::<io::Error>() {
                if matches!(io.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
                    return true;
                }
            }
            cause = e.source();
        }
        false
    }
}

// ── Unclassified ──────────────────────────────────────────────────────────────

/// Catch-all for faults nobody classified, including recovered panics.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct Unclassified {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Unclassified {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn from_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self { message: source.to_string(), source: Some(Box::new(source)) }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// The uniform JSON body of every error response.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

/// Maps an error to the status and body the client sees.
///
/// Pure and deterministic: the same error always yields the same pair.
pub fn classify(err: &Error) -> (StatusCode, ErrorResponse) {
    match err {
        Error::Validation(fields) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse { error: "data validation error".to_owned(), fields: Some(fields.clone()) },
        ),
        Error::Request(e) => (
            e.status(),
            ErrorResponse { error: e.message().to_owned(), fields: None },
        ),
        Error::Auth(_) => generic(StatusCode::UNAUTHORIZED),
        Error::Shutdown(_) | Error::Unclassified(_) => generic(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

fn generic(status: StatusCode) -> (StatusCode, ErrorResponse) {
    let error = status.canonical_reason().unwrap_or("Error").to_owned();
    (status, ErrorResponse { error, fields: None })
}

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// The error type returned by ward's fallible setup operations.
///
/// Request-level failures are [`Error`]s and become responses. This type
/// surfaces failures outside any request: binding, accepting, configuration
/// and key material.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("key `{kid}`: {source}")]
    Key {
        kid: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_display_lists_every_field() {
        let mut fe = FieldErrors::new("name", "required");
        fe.push("email", "invalid");
        assert_eq!(fe.to_string(), "data validation error: name: required, email: invalid");
    }

    #[test]
    fn empty_field_list_is_not_an_error() {
        assert!(FieldErrors::from_vec(Vec::new()).is_none());
    }

    #[test]
    fn connection_loss_is_detected_through_the_source() {
        let err = ShutdownError::with_source("write", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_connection_lost());
        assert!(!ShutdownError::new("integrity").is_connection_lost());
    }

    #[test]
    fn shutdown_is_reported_as_internal_to_the_client() {
        let (status, body) = classify(&Error::shutdown("db corrupted"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal Server Error");
    }

    #[test]
    fn auth_detail_stays_in_the_log() {
        let (status, body) = classify(&Error::auth("token expired"));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"Unauthorized"}"#);
    }

    #[test]
    fn classification_is_repeatable() {
        let errors = [
            Error::from(FieldErrors::new("name", "required")),
            Error::request("gone", StatusCode::GONE),
            Error::auth("bad kid"),
            Error::internal(io::Error::other("disk")),
        ];
        for err in &errors {
            let (s1, b1) = classify(err);
            let (s2, b2) = classify(err);
            assert_eq!(s1, s2);
            assert_eq!(serde_json::to_vec(&b1).unwrap(), serde_json::to_vec(&b2).unwrap());
        }
    }
}
